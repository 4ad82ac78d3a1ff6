use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::workflows::security::answer::Answer;
use crate::workflows::security::catalog::Catalog;
use crate::workflows::security::domain::{
    AnswerSet, CriterionDefinition, CriterionQuestion, CriterionSnapshot, FrameworkDefinition,
    FrameworkQuestion, JustificationSet,
};
use crate::workflows::security::scoring::{default_bands, default_rules};
use crate::workflows::security::service::IntakeService;
use crate::workflows::security::state::{DecisionReducer, WizardAction, WizardState};
use crate::workflows::security::storage::{KeyValueStore, MemoryStore};
use crate::workflows::security::tracker::{
    Acknowledgement, TrackerClient, TrackerError, UpsertRiskRequest, UpsertRiskResponse,
};

pub(super) const TICKET: &str = "CS-201";

pub(super) fn catalog() -> Catalog {
    Catalog::builtin().expect("builtin catalog is valid")
}

pub(super) fn answers(entries: &[(&str, Answer)]) -> AnswerSet {
    entries
        .iter()
        .map(|(qid, answer)| (qid.to_string(), *answer))
        .collect()
}

pub(super) fn justifications(entries: &[(&str, &str)]) -> JustificationSet {
    entries
        .iter()
        .map(|(qid, text)| (qid.to_string(), text.to_string()))
        .collect()
}

/// Framework with questions "1".."n", the default bands and the exposure rule.
pub(super) fn framework(weights: &[f64]) -> FrameworkDefinition {
    FrameworkDefinition {
        id: Some("TEST-FRAMEWORK".to_string()),
        questions: weights
            .iter()
            .enumerate()
            .map(|(index, weight)| FrameworkQuestion {
                id: (index + 1).to_string(),
                text: format!("Pregunta {}", index + 1),
                weight: *weight,
                invert_logic: false,
                dimension: None,
            })
            .collect(),
        bands: default_bands(),
        rules: default_rules(),
    }
}

/// Two-statement criterion; the first asks for a justification when answered yes.
pub(super) fn criterion() -> CriterionDefinition {
    CriterionDefinition {
        id: "CRIT-TEST".to_string(),
        title: "Criterio de prueba".to_string(),
        description: None,
        questions: vec![
            CriterionQuestion {
                id: "q1".to_string(),
                text: "Sin datos sensibles".to_string(),
                requires_justification_when: vec![Answer::Yes],
            },
            CriterionQuestion {
                id: "q2".to_string(),
                text: "Solo red interna".to_string(),
                requires_justification_when: Vec::new(),
            },
        ],
    }
}

pub(super) fn reduce(catalog: &Catalog, state: WizardState, actions: Vec<WizardAction>) -> WizardState {
    let reducer = DecisionReducer::new(catalog);
    actions
        .into_iter()
        .fold(state, |state, action| reducer.apply(&state, action))
}

pub(super) fn confirmed_state(catalog: &Catalog) -> WizardState {
    reduce(
        catalog,
        WizardState::new(),
        vec![
            WizardAction::SetTicketKey {
                key: TICKET.to_lowercase(),
            },
            WizardAction::ConfirmTicket,
        ],
    )
}

/// Select the builtin cosmetic criterion, answer everything yes and justify COS-1.
pub(super) fn cosmetic_ready_actions() -> Vec<WizardAction> {
    vec![
        WizardAction::SelectCriterion {
            id: Some("CRIT-COSMETIC".to_string()),
        },
        WizardAction::SetCriterionAnswer {
            qid: "COS-1".to_string(),
            answer: Answer::Yes,
        },
        WizardAction::SetCriterionAnswer {
            qid: "COS-2".to_string(),
            answer: Answer::Yes,
        },
        WizardAction::SetCriterionJustification {
            qid: "COS-1".to_string(),
            text: "Solo cambia textos del pie de página".to_string(),
        },
    ]
}

/// What accepting after [`cosmetic_ready_actions`] records.
pub(super) fn cosmetic_snapshot(catalog: &Catalog) -> CriterionSnapshot {
    CriterionSnapshot {
        definition: catalog
            .criterion("CRIT-COSMETIC")
            .expect("builtin criterion")
            .clone(),
        answers: answers(&[("COS-1", Answer::Yes), ("COS-2", Answer::Yes)]),
        justifications: justifications(&[("COS-1", "Solo cambia textos del pie de página")]),
    }
}

pub(super) fn all_framework_answers(catalog: &Catalog, answer: Answer) -> AnswerSet {
    catalog
        .framework
        .questions
        .iter()
        .map(|question| (question.id.clone(), answer))
        .collect()
}

pub(super) type TestService = IntakeService<MemoryStore, RecordingTracker>;

pub(super) fn build_service() -> (TestService, Arc<MemoryStore>, Arc<RecordingTracker>) {
    let store = Arc::new(MemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());
    let service = IntakeService::new(Arc::new(catalog()), store.clone(), tracker.clone())
        .with_issue_base_url(Some("https://acme.atlassian.net".to_string()));
    (service, store, tracker)
}

#[derive(Default)]
pub(super) struct RecordingTracker {
    /// Backend posts the comment itself as part of the upsert.
    posts_comment_on_upsert: bool,
    comments: Mutex<Vec<(String, String)>>,
    upserts: Mutex<Vec<UpsertRiskRequest>>,
    labels: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingTracker {
    pub(super) fn posting_comments_on_upsert() -> Self {
        Self {
            posts_comment_on_upsert: true,
            ..Self::default()
        }
    }

    pub(super) fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().expect("tracker mutex poisoned").clone()
    }

    pub(super) fn upserts(&self) -> Vec<UpsertRiskRequest> {
        self.upserts.lock().expect("tracker mutex poisoned").clone()
    }

    pub(super) fn labels(&self) -> Vec<(String, Vec<String>)> {
        self.labels.lock().expect("tracker mutex poisoned").clone()
    }
}

impl TrackerClient for RecordingTracker {
    async fn upsert_risk(
        &self,
        request: &UpsertRiskRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        self.upserts
            .lock()
            .expect("tracker mutex poisoned")
            .push(request.clone());
        Ok(UpsertRiskResponse {
            ok: true,
            updated_labels: Some(vec!["security-risk".to_string()]),
            posted_comment: self.posts_comment_on_upsert.then_some(true),
            ticket: Some(request.ticket.clone()),
        })
    }

    async fn post_comment(
        &self,
        ticket: &str,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        self.comments
            .lock()
            .expect("tracker mutex poisoned")
            .push((ticket.to_string(), text.to_string()));
        Ok(Acknowledgement { ok: true })
    }

    async fn set_labels(
        &self,
        ticket: &str,
        labels: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        self.labels
            .lock()
            .expect("tracker mutex poisoned")
            .push((ticket.to_string(), labels.to_vec()));
        Ok(Acknowledgement { ok: true })
    }
}

/// Tracker that rejects upserts but would accept comments.
#[derive(Default)]
pub(super) struct RejectingUpsertTracker {
    comments: Mutex<Vec<String>>,
}

impl RejectingUpsertTracker {
    pub(super) fn comment_count(&self) -> usize {
        self.comments.lock().expect("tracker mutex poisoned").len()
    }
}

impl TrackerClient for RejectingUpsertTracker {
    async fn upsert_risk(
        &self,
        _request: &UpsertRiskRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        Err(TrackerError::Status {
            status: 503,
            body: "risk store unavailable".to_string(),
        })
    }

    async fn post_comment(
        &self,
        _ticket: &str,
        text: &str,
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        self.comments
            .lock()
            .expect("tracker mutex poisoned")
            .push(text.to_string());
        Ok(Acknowledgement { ok: true })
    }

    async fn set_labels(
        &self,
        _ticket: &str,
        _labels: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        Ok(Acknowledgement { ok: true })
    }
}

/// Drive a fresh session through the cosmetic criterion up to an accepted decision.
pub(super) fn accept_cosmetic<S, T>(service: &IntakeService<S, T>)
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    service
        .dispatch(TICKET, WizardAction::ConfirmTicket)
        .expect("confirm");
    for action in cosmetic_ready_actions() {
        service.dispatch(TICKET, action).expect("criterion buffers");
    }
    let outcome = service
        .dispatch(TICKET, WizardAction::AcceptCriterion)
        .expect("accept");
    assert!(outcome.applied, "cosmetic criterion accepted: {:?}", outcome.reason);
}

/// Tracker whose every call times out.
pub(super) struct TimeoutTracker;

impl TrackerClient for TimeoutTracker {
    async fn upsert_risk(
        &self,
        _request: &UpsertRiskRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpsertRiskResponse, TrackerError> {
        Err(TrackerError::Timeout)
    }

    async fn post_comment(
        &self,
        _ticket: &str,
        _text: &str,
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        Err(TrackerError::Timeout)
    }

    async fn set_labels(
        &self,
        _ticket: &str,
        _labels: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Acknowledgement, TrackerError> {
        Err(TrackerError::Timeout)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
