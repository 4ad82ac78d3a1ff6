use serde::{Deserialize, Serialize};
use tracing::debug;

use super::answer::Answer;
use super::catalog::Catalog;
use super::criteria::{evaluate_criterion, ready_to_accept, CriterionStatus};
use super::domain::{
    is_valid_ticket_key, normalize_ticket_key, AnswerSet, CriterionSnapshot, JustificationSet,
};

/// Where the criterion fast-track currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionOutcome {
    #[default]
    Pending,
    /// A criterion was accepted; the framework is not needed.
    Pass,
    /// No criterion applies; the framework decides.
    Fail,
}

/// Everything the wizard knows about the ticket being assessed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardState {
    pub ticket_key: String,
    pub ticket_confirmed: bool,
    pub selected_criterion_id: Option<String>,
    pub criterion_answers: AnswerSet,
    pub criterion_justifications: JustificationSet,
    pub framework_answers: AnswerSet,
    pub criterion_outcome: CriterionOutcome,
    pub criterion_review_requested: bool,
    pub accepted_snapshot: Option<CriterionSnapshot>,
    pub review_snapshot: Option<CriterionSnapshot>,
    pub notes: String,
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pristine state bound to a ticket key, as used when a session is opened.
    pub fn for_ticket(key: &str) -> Self {
        Self {
            ticket_key: normalize_ticket_key(key),
            ..Self::default()
        }
    }
}

/// Every change the wizard can request. Each variant carries only what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardAction {
    SetTicketKey {
        key: String,
    },
    ConfirmTicket,
    ChangeTicket,
    SelectCriterion {
        #[serde(default)]
        id: Option<String>,
    },
    SetCriterionAnswer {
        qid: String,
        answer: Answer,
    },
    SetCriterionJustification {
        qid: String,
        text: String,
    },
    /// Wholesale swap used when hydrating from storage.
    ReplaceCriterionBuffers {
        #[serde(default)]
        answers: AnswerSet,
        #[serde(default)]
        justifications: JustificationSet,
    },
    /// Freeze the selected criterion and its buffers as the accepted decision.
    AcceptCriterion,
    /// Freeze the selected criterion and its buffers for a manual review.
    RequestReview,
    ResetCriteria,
    /// No criterion applies; continue with the framework.
    SkipToFramework,
    SetFrameworkAnswer {
        qid: String,
        answer: Answer,
    },
    ReplaceFrameworkAnswers {
        #[serde(default)]
        answers: AnswerSet,
    },
    SetNotes {
        notes: String,
    },
    ResetAll,
}

impl WizardAction {
    pub const fn name(&self) -> &'static str {
        match self {
            WizardAction::SetTicketKey { .. } => "set_ticket_key",
            WizardAction::ConfirmTicket => "confirm_ticket",
            WizardAction::ChangeTicket => "change_ticket",
            WizardAction::SelectCriterion { .. } => "select_criterion",
            WizardAction::SetCriterionAnswer { .. } => "set_criterion_answer",
            WizardAction::SetCriterionJustification { .. } => "set_criterion_justification",
            WizardAction::ReplaceCriterionBuffers { .. } => "replace_criterion_buffers",
            WizardAction::AcceptCriterion => "accept_criterion",
            WizardAction::RequestReview => "request_review",
            WizardAction::ResetCriteria => "reset_criteria",
            WizardAction::SkipToFramework => "skip_to_framework",
            WizardAction::SetFrameworkAnswer { .. } => "set_framework_answer",
            WizardAction::ReplaceFrameworkAnswers { .. } => "replace_framework_answers",
            WizardAction::SetNotes { .. } => "set_notes",
            WizardAction::ResetAll => "reset_all",
        }
    }
}

/// Unmet precondition; the action leaves the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("ticket key '{0}' does not match PROJECT-NUMBER")]
    InvalidTicketKey(String),
    #[error("ticket has not been confirmed")]
    TicketNotConfirmed,
    #[error("criterion '{0}' is not in the catalog")]
    UnknownCriterion(String),
    #[error("no criterion is selected")]
    NoCriterionSelected,
    #[error("question '{0}' does not belong to the selected criterion")]
    ForeignQuestion(String),
    #[error("criterion does not pass or lacks required justifications")]
    NotReadyToAccept,
    #[error("criterion has no answers to review")]
    NothingToReview,
}

/// Pure transition function over [`WizardState`].
pub struct DecisionReducer<'a> {
    catalog: &'a Catalog,
}

impl<'a> DecisionReducer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Apply an action. Unmet preconditions yield an unchanged copy of `state`.
    pub fn apply(&self, state: &WizardState, action: WizardAction) -> WizardState {
        self.try_apply(state, action)
            .unwrap_or_else(|_| state.clone())
    }

    /// Same as [`apply`](Self::apply) but reports why an action was ignored.
    pub fn try_apply(
        &self,
        state: &WizardState,
        action: WizardAction,
    ) -> Result<WizardState, Rejection> {
        let name = action.name();
        match self.transition(state, action) {
            Ok(next) => {
                debug!(action = name, ticket = %next.ticket_key, "wizard transition applied");
                Ok(next)
            }
            Err(rejection) => {
                debug!(action = name, ticket = %state.ticket_key, %rejection, "wizard action ignored");
                Err(rejection)
            }
        }
    }

    fn transition(&self, state: &WizardState, action: WizardAction) -> Result<WizardState, Rejection> {
        let mut next = state.clone();

        match action {
            WizardAction::SetTicketKey { key } => {
                next.ticket_key = normalize_ticket_key(&key);
            }
            WizardAction::ConfirmTicket => {
                if !is_valid_ticket_key(&state.ticket_key) {
                    return Err(Rejection::InvalidTicketKey(state.ticket_key.clone()));
                }
                next.ticket_confirmed = true;
            }
            WizardAction::ChangeTicket => {
                if !state.ticket_confirmed {
                    return Err(Rejection::TicketNotConfirmed);
                }
                next = WizardState {
                    ticket_key: state.ticket_key.clone(),
                    notes: state.notes.clone(),
                    ..WizardState::default()
                };
            }
            WizardAction::SelectCriterion { id } => {
                if let Some(id) = &id {
                    if !self.catalog.is_known_criterion(id) {
                        return Err(Rejection::UnknownCriterion(id.clone()));
                    }
                }
                next.selected_criterion_id = id;
            }
            WizardAction::SetCriterionAnswer { qid, answer } => {
                let selected = state
                    .selected_criterion_id
                    .as_deref()
                    .and_then(|id| self.catalog.criterion(id))
                    .ok_or(Rejection::NoCriterionSelected)?;
                if !selected.questions.iter().any(|question| question.id == qid) {
                    return Err(Rejection::ForeignQuestion(qid));
                }
                next.criterion_answers.insert(qid, answer);
            }
            WizardAction::SetCriterionJustification { qid, text } => {
                next.criterion_justifications.insert(qid, text);
            }
            WizardAction::ReplaceCriterionBuffers {
                answers,
                justifications,
            } => {
                next.criterion_answers = answers;
                next.criterion_justifications = justifications;
            }
            WizardAction::AcceptCriterion => {
                let snapshot = self.capture_snapshot(state)?;
                let evaluation = evaluate_criterion(&snapshot.definition, &snapshot.answers);
                if !ready_to_accept(
                    &snapshot.definition,
                    &evaluation,
                    &snapshot.answers,
                    &snapshot.justifications,
                ) {
                    return Err(Rejection::NotReadyToAccept);
                }
                next.criterion_outcome = CriterionOutcome::Pass;
                next.accepted_snapshot = Some(snapshot);
                next.criterion_review_requested = false;
                next.review_snapshot = None;
                next.selected_criterion_id = None;
            }
            WizardAction::RequestReview => {
                let snapshot = self.capture_snapshot(state)?;
                let evaluation = evaluate_criterion(&snapshot.definition, &snapshot.answers);
                if evaluation.status != CriterionStatus::Review && snapshot.answers.is_empty() {
                    return Err(Rejection::NothingToReview);
                }
                next.criterion_review_requested = true;
                next.review_snapshot = Some(snapshot);
            }
            WizardAction::ResetCriteria => {
                next.criterion_outcome = CriterionOutcome::Pending;
                next.accepted_snapshot = None;
                next.criterion_review_requested = false;
                next.review_snapshot = None;
            }
            WizardAction::SkipToFramework => {
                if !state.ticket_confirmed {
                    return Err(Rejection::TicketNotConfirmed);
                }
                next.criterion_outcome = CriterionOutcome::Fail;
                next.selected_criterion_id = None;
            }
            WizardAction::SetFrameworkAnswer { qid, answer } => {
                next.framework_answers.insert(qid, answer);
            }
            WizardAction::ReplaceFrameworkAnswers { answers } => {
                next.framework_answers = answers;
            }
            WizardAction::SetNotes { notes } => {
                next.notes = notes;
            }
            WizardAction::ResetAll => {
                next = WizardState::default();
            }
        }

        Ok(next)
    }

    /// Snapshot of the selected catalog criterion and the buffered answers for its questions.
    ///
    /// Every `yes` answer that asks for a justification gets an entry, blank if none was given.
    fn capture_snapshot(&self, state: &WizardState) -> Result<CriterionSnapshot, Rejection> {
        if !state.ticket_confirmed {
            return Err(Rejection::TicketNotConfirmed);
        }
        let definition = state
            .selected_criterion_id
            .as_deref()
            .and_then(|id| self.catalog.criterion(id))
            .ok_or(Rejection::NoCriterionSelected)?;

        let mut answers = AnswerSet::new();
        let mut justifications = JustificationSet::new();
        for question in &definition.questions {
            let answer = state.criterion_answers.get(&question.id).copied();
            if let Some(answer) = answer {
                answers.insert(question.id.clone(), answer);
            }
            match state.criterion_justifications.get(&question.id) {
                Some(text) => {
                    justifications.insert(question.id.clone(), text.clone());
                }
                None if answer.is_some_and(|answer| question.requires_justification(answer)) => {
                    justifications.insert(question.id.clone(), String::new());
                }
                None => {}
            }
        }

        Ok(CriterionSnapshot {
            definition: definition.clone(),
            answers,
            justifications,
        })
    }
}
