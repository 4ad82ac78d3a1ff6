use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::common::*;

use crate::workflows::security::answer::Answer;
use crate::workflows::security::comments::{CommentKind, DecisionMode};
use crate::workflows::security::query::IntakeQuery;
use crate::workflows::security::service::{IntakeService, IntakeServiceError};
use crate::workflows::security::state::{CriterionOutcome, WizardAction};
use crate::workflows::security::storage::{storage_key, KeyValueStore, MemoryStore, NS_NOTES};
use crate::workflows::security::tracker::TrackerError;

fn confirm(service: &TestService) {
    let outcome = service
        .dispatch(TICKET, WizardAction::ConfirmTicket)
        .expect("dispatch succeeds");
    assert!(outcome.applied);
}

#[test]
fn open_hydrates_from_link_and_storage() {
    let (service, store, _) = build_service();
    store
        .set(&storage_key(NS_NOTES, TICKET), r#""desde almacenamiento""#.to_string())
        .expect("seed notes");

    let session = service
        .open(&IntakeQuery {
            ticket: Some("cs-201".to_string()),
            criterion: Some("CRIT-COSMETIC".to_string()),
        })
        .expect("session opens");

    assert_eq!(session.ticket, TICKET);
    assert_eq!(session.state.notes, "desde almacenamiento");
    assert_eq!(session.state.selected_criterion_id.as_deref(), Some("CRIT-COSMETIC"));
    assert_eq!(session.query, "t=CS-201&crit=CRIT-COSMETIC");
    assert_eq!(
        session.issue_url.as_deref(),
        Some("https://acme.atlassian.net/browse/CS-201")
    );
    assert!(!session.state.ticket_confirmed);
}

#[test]
fn open_rejects_missing_or_invalid_tickets() {
    let (service, _, _) = build_service();

    assert!(matches!(
        service.open(&IntakeQuery::default()),
        Err(IntakeServiceError::InvalidTicket(_))
    ));
    assert!(matches!(
        service.view("not a ticket"),
        Err(IntakeServiceError::InvalidTicket(_))
    ));
}

#[test]
fn rejected_actions_report_the_reason_and_keep_state() {
    let (service, _, _) = build_service();

    let outcome = service
        .dispatch(TICKET, WizardAction::SkipToFramework)
        .expect("dispatch succeeds");

    assert!(!outcome.applied);
    assert_eq!(outcome.reason.as_deref(), Some("ticket has not been confirmed"));
    assert_eq!(outcome.session.state.criterion_outcome, CriterionOutcome::Pending);
}

#[test]
fn sessions_cannot_be_rebound_to_another_ticket() {
    let (service, _, _) = build_service();

    let result = service.dispatch(
        TICKET,
        WizardAction::SetTicketKey {
            key: "OPS-9".to_string(),
        },
    );
    assert!(matches!(
        result,
        Err(IntakeServiceError::TicketRebind { ref requested, .. }) if requested == "OPS-9"
    ));

    let outcome = service
        .dispatch(
            TICKET,
            WizardAction::SetTicketKey {
                key: "cs-201".to_string(),
            },
        )
        .expect("restating the key is allowed");
    assert!(outcome.applied);
}

#[test]
fn criterion_buffers_follow_the_selection() {
    let (service, _, _) = build_service();
    confirm(&service);

    let select = |id: &str| WizardAction::SelectCriterion {
        id: Some(id.to_string()),
    };

    service.dispatch(TICKET, select("CRIT-COSMETIC")).expect("select");
    service
        .dispatch(
            TICKET,
            WizardAction::SetCriterionAnswer {
                qid: "COS-1".to_string(),
                answer: Answer::Yes,
            },
        )
        .expect("answer");

    let switched = service
        .dispatch(TICKET, select("CRIT-INTERNAL-NO-DATA"))
        .expect("switch");
    assert!(switched.session.state.criterion_answers.is_empty());

    let back = service.dispatch(TICKET, select("CRIT-COSMETIC")).expect("back");
    assert_eq!(
        back.session.state.criterion_answers,
        answers(&[("COS-1", Answer::Yes)])
    );
}

#[test]
fn sessions_survive_a_restart_through_storage() {
    let store = Arc::new(MemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());
    let first = IntakeService::new(Arc::new(catalog()), store.clone(), tracker.clone());
    first
        .dispatch(
            TICKET,
            WizardAction::SetFrameworkAnswer {
                qid: "2".to_string(),
                answer: Answer::Unknown,
            },
        )
        .expect("answer");
    first
        .dispatch(
            TICKET,
            WizardAction::SetNotes {
                notes: "contexto".to_string(),
            },
        )
        .expect("notes");

    let second = IntakeService::new(Arc::new(catalog()), store, tracker);
    let session = second.view(TICKET).expect("view");

    assert_eq!(session.state.framework_answers, answers(&[("2", Answer::Unknown)]));
    assert_eq!(session.state.notes, "contexto");
}

#[test]
fn reset_all_clears_storage_but_keeps_the_ticket() {
    let (service, store, _) = build_service();
    service
        .dispatch(
            TICKET,
            WizardAction::SetNotes {
                notes: "borrar".to_string(),
            },
        )
        .expect("notes");

    let outcome = service
        .dispatch(TICKET, WizardAction::ResetAll)
        .expect("reset");

    assert!(outcome.applied);
    assert_eq!(outcome.session.state.ticket_key, TICKET);
    assert!(outcome.session.state.notes.is_empty());
    assert_eq!(store.get(&storage_key(NS_NOTES, TICKET)).expect("read"), None);
}

#[test]
fn comment_requires_a_decision() {
    let (service, _, _) = build_service();
    confirm(&service);

    assert!(matches!(
        service.comment(TICKET),
        Err(IntakeServiceError::NoDecision(ticket)) if ticket == TICKET
    ));

    accept_cosmetic(&service);
    let rendered = service.comment(TICKET).expect("comment rendered");
    assert_eq!(rendered.kind, CommentKind::CriterionAcceptance);
}

#[test]
fn accept_is_judged_on_the_session_buffers() {
    let (service, _, _) = build_service();
    confirm(&service);
    for action in cosmetic_ready_actions() {
        service.dispatch(TICKET, action).expect("buffers");
    }
    service
        .dispatch(
            TICKET,
            WizardAction::SetCriterionAnswer {
                qid: "COS-1".to_string(),
                answer: Answer::No,
            },
        )
        .expect("answer");

    let outcome = service
        .dispatch(TICKET, WizardAction::AcceptCriterion)
        .expect("dispatch succeeds");

    assert!(!outcome.applied);
    assert_eq!(outcome.session.state.criterion_outcome, CriterionOutcome::Pending);
    assert!(matches!(
        service.comment(TICKET),
        Err(IntakeServiceError::NoDecision(_))
    ));
}

#[test]
fn read_paths_do_not_register_sessions() {
    let (service, _, _) = build_service();

    for n in 1..=50 {
        let ticket = format!("XX-{n}");
        service.view(&ticket).expect("view");
        assert!(matches!(
            service.comment(&ticket),
            Err(IntakeServiceError::NoDecision(_))
        ));
    }
    service
        .open(&IntakeQuery {
            ticket: Some("YY-1".to_string()),
            criterion: None,
        })
        .expect("open without criterion");
    assert_eq!(service.active_sessions().expect("count"), 0);

    service
        .open(&IntakeQuery {
            ticket: Some("YY-2".to_string()),
            criterion: Some("CRIT-COSMETIC".to_string()),
        })
        .expect("open with criterion");
    confirm(&service);
    assert_eq!(service.active_sessions().expect("count"), 2);

    let rejected = service
        .dispatch("ZZ-1", WizardAction::SkipToFramework)
        .expect("dispatch");
    assert!(!rejected.applied);
    assert_eq!(service.active_sessions().expect("count"), 2);

    service
        .dispatch(TICKET, WizardAction::ResetAll)
        .expect("reset");
    assert_eq!(service.active_sessions().expect("count"), 1);
}

#[test]
fn selecting_a_criterion_keeps_unsaved_entries() {
    let store = Arc::new(MemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());
    let select_internal = || WizardAction::SelectCriterion {
        id: Some("CRIT-INTERNAL-NO-DATA".to_string()),
    };

    let earlier = IntakeService::new(Arc::new(catalog()), store.clone(), tracker.clone());
    earlier.dispatch(TICKET, select_internal()).expect("select");
    earlier
        .dispatch(
            TICKET,
            WizardAction::SetCriterionAnswer {
                qid: "INT-1".to_string(),
                answer: Answer::Yes,
            },
        )
        .expect("answer");
    earlier
        .dispatch(
            TICKET,
            WizardAction::SetCriterionJustification {
                qid: "INT-1".to_string(),
                text: "almacenada".to_string(),
            },
        )
        .expect("justify");

    let service = IntakeService::new(Arc::new(catalog()), store, tracker);
    service
        .dispatch(
            TICKET,
            WizardAction::SetCriterionJustification {
                qid: "INT-1".to_string(),
                text: "Solo accesible por VPN".to_string(),
            },
        )
        .expect("justify before selecting");

    let outcome = service.dispatch(TICKET, select_internal()).expect("select");

    assert_eq!(
        outcome.session.state.criterion_answers,
        answers(&[("INT-1", Answer::Yes)])
    );
    assert_eq!(
        outcome.session.state.criterion_justifications,
        justifications(&[("INT-1", "Solo accesible por VPN")])
    );
}

#[tokio::test]
async fn submit_posts_comment_and_upserts_decision() {
    let (service, _, tracker) = build_service();
    confirm(&service);
    service
        .dispatch(TICKET, WizardAction::SkipToFramework)
        .expect("skip");
    service
        .dispatch(
            TICKET,
            WizardAction::ReplaceFrameworkAnswers {
                answers: all_framework_answers(&catalog(), Answer::No),
            },
        )
        .expect("answers");

    let receipt = service
        .submit(TICKET, &CancellationToken::new())
        .await
        .expect("submission succeeds");

    assert_eq!(receipt.kind, CommentKind::Framework);
    assert!(receipt.comment_posted);
    assert_eq!(receipt.payload.decision.mode, DecisionMode::Framework);
    assert_eq!(receipt.tracker.ticket.as_deref(), Some(TICKET));

    let comments = tracker.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].0, TICKET);
    assert!(comments[0].1.contains("Nivel: **Medio** (5 pts)."));

    let upserts = tracker.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].mode, DecisionMode::Framework);
    assert!(upserts[0].criterion.is_none());
    assert_eq!(upserts[0].notes, None);
}

#[tokio::test]
async fn submit_refuses_an_incomplete_framework() {
    let (service, _, tracker) = build_service();
    confirm(&service);
    service
        .dispatch(TICKET, WizardAction::SkipToFramework)
        .expect("skip");

    let result = service.submit(TICKET, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(IntakeServiceError::IncompleteFramework { answered: 0, total: 8 })
    ));
    assert!(tracker.comments().is_empty());
}

#[tokio::test]
async fn incomplete_count_ignores_unknown_question_ids() {
    let (service, _, _) = build_service();
    confirm(&service);
    service
        .dispatch(TICKET, WizardAction::SkipToFramework)
        .expect("skip");
    service
        .dispatch(
            TICKET,
            WizardAction::ReplaceFrameworkAnswers {
                answers: answers(&[("1", Answer::Yes), ("99", Answer::No), ("legacy", Answer::Yes)]),
            },
        )
        .expect("answers");

    let result = service.submit(TICKET, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(IntakeServiceError::IncompleteFramework { answered: 1, total: 8 })
    ));
}

#[tokio::test]
async fn failed_upsert_posts_no_comment() {
    let tracker = Arc::new(RejectingUpsertTracker::default());
    let service = IntakeService::new(
        Arc::new(catalog()),
        Arc::new(MemoryStore::default()),
        tracker.clone(),
    );
    accept_cosmetic(&service);

    let result = service.submit(TICKET, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(IntakeServiceError::Tracker(TrackerError::Status { status: 503, .. }))
    ));
    assert_eq!(tracker.comment_count(), 0);
}

#[tokio::test]
async fn backend_posted_comment_is_not_repeated() {
    let tracker = Arc::new(RecordingTracker::posting_comments_on_upsert());
    let service = IntakeService::new(
        Arc::new(catalog()),
        Arc::new(MemoryStore::default()),
        tracker.clone(),
    );
    accept_cosmetic(&service);

    let receipt = service
        .submit(TICKET, &CancellationToken::new())
        .await
        .expect("submission succeeds");

    assert!(receipt.comment_posted);
    assert_eq!(receipt.tracker.posted_comment, Some(true));
    assert_eq!(tracker.upserts().len(), 1);
    assert!(tracker.comments().is_empty());
}

#[tokio::test]
async fn labels_are_cleaned_before_reaching_the_tracker() {
    let (service, _, tracker) = build_service();
    let labels = vec![
        " security-risk ".to_string(),
        String::new(),
        "security-risk".to_string(),
        "sro-alto".to_string(),
    ];

    let acknowledgement = service
        .label("cs-201", &labels, &CancellationToken::new())
        .await
        .expect("labels applied");

    assert!(acknowledgement.ok);
    assert_eq!(
        tracker.labels(),
        vec![(
            TICKET.to_string(),
            vec!["security-risk".to_string(), "sro-alto".to_string()]
        )]
    );

    assert!(matches!(
        service
            .label(TICKET, &[" ".to_string()], &CancellationToken::new())
            .await,
        Err(IntakeServiceError::NoLabels)
    ));
    assert!(matches!(
        service
            .label("nope", &labels, &CancellationToken::new())
            .await,
        Err(IntakeServiceError::InvalidTicket(_))
    ));
}

#[tokio::test]
async fn submit_surfaces_tracker_timeouts() {
    let service = IntakeService::new(
        Arc::new(catalog()),
        Arc::new(MemoryStore::default()),
        Arc::new(TimeoutTracker),
    );
    accept_cosmetic(&service);

    let result = service.submit(TICKET, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(IntakeServiceError::Tracker(TrackerError::Timeout))
    ));
}
