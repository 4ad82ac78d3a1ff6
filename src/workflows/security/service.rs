use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::catalog::Catalog;
use super::comments::{build_payload, render_decision, CommentKind, RenderedDecision, RiskPayload};
use super::domain::{normalize_ticket_key, CriterionDefinition, TicketKey};
use super::query::IntakeQuery;
use super::scoring::compute_score_and_band;
use super::selectors::{wizard_view, WizardView};
use super::state::{DecisionReducer, WizardAction, WizardState};
use super::storage::{merge_missing, IntakeStorage, KeyValueStore, StorageError};
use super::tracker::{
    issue_url, Acknowledgement, TrackerClient, TrackerError, UpsertRiskRequest,
    UpsertRiskResponse,
};

/// Service holding one wizard session per ticket, backed by storage and the tracker client.
pub struct IntakeService<S, T> {
    catalog: Arc<Catalog>,
    storage: IntakeStorage<S>,
    tracker: Arc<T>,
    sessions: Mutex<HashMap<TicketKey, WizardState>>,
    issue_base_url: Option<String>,
    shutdown: CancellationToken,
}

/// State plus everything derived from it, as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub ticket: String,
    pub state: WizardState,
    /// Shareable `t=..&crit=..` parameters for the current state.
    pub query: String,
    pub view: WizardView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
}

/// Result of dispatching one action; rejected actions leave the session untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub session: SessionView,
}

/// What was delivered to the tracker for a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub ticket: String,
    pub kind: CommentKind,
    pub comment: String,
    pub comment_posted: bool,
    pub payload: RiskPayload,
    pub tracker: UpsertRiskResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
}

impl<S, T> IntakeService<S, T>
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    pub fn new(catalog: Arc<Catalog>, store: Arc<S>, tracker: Arc<T>) -> Self {
        Self {
            catalog,
            storage: IntakeStorage::new(store),
            tracker,
            sessions: Mutex::new(HashMap::new()),
            issue_base_url: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_issue_base_url(mut self, base_url: Option<String>) -> Self {
        self.issue_base_url = base_url;
        self
    }

    /// Parent token for in-flight tracker calls; cancelling it aborts every submission.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Sessions holding state that storage alone cannot rebuild.
    pub fn active_sessions(&self) -> Result<usize, IntakeServiceError> {
        Ok(self.sessions()?.len())
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<TicketKey, WizardState>>, IntakeServiceError> {
        self.sessions
            .lock()
            .map_err(|_| IntakeServiceError::SessionsUnavailable)
    }

    fn ticket_key(raw: &str) -> Result<TicketKey, IntakeServiceError> {
        TicketKey::parse(raw).ok_or_else(|| IntakeServiceError::InvalidTicket(raw.to_string()))
    }

    /// Fresh state for `key`, hydrated from the link parameters and then from storage.
    fn hydrate(&self, key: &TicketKey, query: Option<&IntakeQuery>) -> WizardState {
        let reducer = DecisionReducer::new(&self.catalog);
        let mut state = WizardState::for_ticket(key.as_str());

        if let Some(query) = query {
            for action in query.hydration_actions(&self.catalog) {
                if !matches!(action, WizardAction::SetTicketKey { .. }) {
                    state = reducer.apply(&state, action);
                }
            }
        }

        for action in self.storage.hydration_actions(&state) {
            state = reducer.apply(&state, action);
        }

        state
    }

    fn session_view(&self, key: &TicketKey, state: &WizardState) -> SessionView {
        SessionView {
            ticket: key.to_string(),
            state: state.clone(),
            query: IntakeQuery::from_state(state).to_query_string(),
            view: wizard_view(&self.catalog, state),
            issue_url: issue_url(self.issue_base_url.as_deref(), key.as_str()),
        }
    }

    /// Current state without registering a session; unknown tickets hydrate from storage.
    fn snapshot(&self, key: &TicketKey) -> Result<WizardState, IntakeServiceError> {
        let sessions = self.sessions()?;
        Ok(match sessions.get(key) {
            Some(state) => state.clone(),
            None => self.hydrate(key, None),
        })
    }

    /// Buffers for a newly selected criterion: in-memory entries for its questions win over
    /// the stored ones.
    fn selection_buffers(
        &self,
        key: &TicketKey,
        definition: &CriterionDefinition,
        state: &WizardState,
    ) -> WizardAction {
        let stored = self.storage.load_criterion_buffers(key.as_str(), &definition.id);
        WizardAction::ReplaceCriterionBuffers {
            answers: merge_missing(&owned_entries(definition, &state.criterion_answers), stored.answers),
            justifications: merge_missing(
                &owned_entries(definition, &state.criterion_justifications),
                stored.justifications,
            ),
        }
    }

    /// Open (or reopen) the session named by a shareable link.
    pub fn open(&self, query: &IntakeQuery) -> Result<SessionView, IntakeServiceError> {
        let raw = query.ticket.as_deref().unwrap_or_default();
        let key = Self::ticket_key(raw)?;

        {
            let mut sessions = self.sessions()?;
            if !sessions.contains_key(&key) {
                let state = self.hydrate(&key, Some(query));
                info!(ticket = %key, criterion = ?state.selected_criterion_id, "intake session opened");
                let view = self.session_view(&key, &state);
                // Only a link that selects a criterion carries state storage cannot rebuild.
                if state.selected_criterion_id.is_some() {
                    sessions.insert(key, state);
                }
                return Ok(view);
            }
        }

        let criterion = query
            .criterion
            .as_deref()
            .filter(|id| self.catalog.is_known_criterion(id));
        match criterion {
            Some(id) => {
                let action = WizardAction::SelectCriterion {
                    id: Some(id.to_string()),
                };
                self.dispatch(key.as_str(), action).map(|outcome| outcome.session)
            }
            None => self.view(key.as_str()),
        }
    }

    pub fn view(&self, ticket: &str) -> Result<SessionView, IntakeServiceError> {
        let key = Self::ticket_key(ticket)?;
        let state = self.snapshot(&key)?;
        Ok(self.session_view(&key, &state))
    }

    /// Apply one action to the ticket's session and persist the result.
    ///
    /// A session is bound to its ticket: `SetTicketKey` may only restate the same key.
    pub fn dispatch(
        &self,
        ticket: &str,
        action: WizardAction,
    ) -> Result<DispatchOutcome, IntakeServiceError> {
        let key = Self::ticket_key(ticket)?;

        if let WizardAction::SetTicketKey { key: requested } = &action {
            let requested = normalize_ticket_key(requested);
            if requested != key.as_str() {
                return Err(IntakeServiceError::TicketRebind {
                    session: key.to_string(),
                    requested,
                });
            }
        }

        let mut sessions = self.sessions()?;
        let current = match sessions.get(&key) {
            Some(state) => state.clone(),
            None => self.hydrate(&key, None),
        };

        let reducer = DecisionReducer::new(&self.catalog);
        let reset = matches!(action, WizardAction::ResetAll);

        let mut next = match reducer.try_apply(&current, action) {
            Ok(next) => next,
            Err(rejection) => {
                return Ok(DispatchOutcome {
                    applied: false,
                    reason: Some(rejection.to_string()),
                    session: self.session_view(&key, &current),
                });
            }
        };

        if reset {
            self.storage.clear(key.as_str())?;
            sessions.remove(&key);
            info!(ticket = %key, "intake session reset");
            return Ok(DispatchOutcome {
                applied: true,
                reason: None,
                session: self.session_view(&key, &WizardState::for_ticket(key.as_str())),
            });
        }

        if next.selected_criterion_id != current.selected_criterion_id {
            if let Some(definition) = next
                .selected_criterion_id
                .as_deref()
                .and_then(|id| self.catalog.criterion(id))
            {
                let buffers = self.selection_buffers(&key, definition, &next);
                next = reducer.apply(&next, buffers);
            }
        }
        self.storage.persist(&next);

        let session = self.session_view(&key, &next);
        sessions.insert(key, next);
        Ok(DispatchOutcome {
            applied: true,
            reason: None,
            session,
        })
    }

    /// Comment for the decision the session currently records.
    pub fn comment(&self, ticket: &str) -> Result<RenderedDecision, IntakeServiceError> {
        let key = Self::ticket_key(ticket)?;
        let state = self.snapshot(&key)?;
        render_decision(&self.catalog, &state)
            .ok_or_else(|| IntakeServiceError::NoDecision(key.to_string()))
    }

    /// Upsert the structured decision on the tracker, then post the rendered comment unless
    /// the backend already did.
    ///
    /// Framework decisions are only delivered once every question is answered.
    pub async fn submit(
        &self,
        ticket: &str,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, IntakeServiceError> {
        let key = Self::ticket_key(ticket)?;
        let state = self.snapshot(&key)?;
        let rendered = render_decision(&self.catalog, &state)
            .ok_or_else(|| IntakeServiceError::NoDecision(key.to_string()))?;

        if let Some(framework) = rendered.framework.as_ref().filter(|snapshot| !snapshot.complete) {
            let scored = compute_score_and_band(&framework.answers, &framework.definition);
            return Err(IntakeServiceError::IncompleteFramework {
                answered: scored.answered_count,
                total: scored.total_questions,
            });
        }

        let mode = rendered.kind.mode();
        let notes = Some(state.notes.trim())
            .filter(|notes| !notes.is_empty())
            .map(str::to_string);
        let payload = build_payload(
            key.as_str(),
            mode,
            rendered.criterion.as_ref(),
            rendered.framework.as_ref(),
            notes.as_deref(),
            Utc::now(),
        );

        let request = UpsertRiskRequest {
            ticket: key.to_string(),
            mode,
            criterion: rendered.criterion.clone(),
            framework: rendered.framework.clone(),
            notes,
        };
        let response = self.tracker.upsert_risk(&request, cancel).await?;

        // The comment follows a recorded decision, so a failed upsert never leaves one behind.
        let comment_posted = if response.posted_comment == Some(true) {
            true
        } else {
            let acknowledgement = self
                .tracker
                .post_comment(key.as_str(), &rendered.comment, cancel)
                .await?;
            if !acknowledgement.ok {
                warn!(ticket = %key, "tracker did not acknowledge the comment");
            }
            acknowledgement.ok
        };

        info!(ticket = %key, kind = ?rendered.kind, ok = response.ok, comment_posted, "risk decision submitted");

        Ok(SubmissionReceipt {
            ticket: key.to_string(),
            kind: rendered.kind,
            comment: rendered.comment,
            comment_posted,
            payload,
            tracker: response,
            issue_url: issue_url(self.issue_base_url.as_deref(), key.as_str()),
        })
    }

    /// Replace the ticket's labels on the tracker. Blank and repeated labels are dropped.
    pub async fn label(
        &self,
        ticket: &str,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<Acknowledgement, IntakeServiceError> {
        let key = Self::ticket_key(ticket)?;

        let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels.iter().map(|label| label.trim()).filter(|label| !label.is_empty()) {
            if !cleaned.iter().any(|seen| seen == label) {
                cleaned.push(label.to_string());
            }
        }
        if cleaned.is_empty() {
            return Err(IntakeServiceError::NoLabels);
        }

        let acknowledgement = self.tracker.set_labels(key.as_str(), &cleaned, cancel).await?;
        info!(ticket = %key, labels = ?cleaned, ok = acknowledgement.ok, "tracker labels updated");
        Ok(acknowledgement)
    }
}

fn owned_entries<V: Clone>(
    definition: &CriterionDefinition,
    buffer: &BTreeMap<String, V>,
) -> BTreeMap<String, V> {
    buffer
        .iter()
        .filter(|(qid, _)| definition.questions.iter().any(|question| &question.id == *qid))
        .map(|(qid, value)| (qid.clone(), value.clone()))
        .collect()
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeServiceError {
    #[error("'{0}' is not a valid ticket key")]
    InvalidTicket(String),
    #[error("session for {session} cannot be rebound to {requested}")]
    TicketRebind { session: String, requested: String },
    #[error("no decision has been recorded for {0}")]
    NoDecision(String),
    #[error("framework incomplete: {answered} of {total} questions answered")]
    IncompleteFramework { answered: usize, total: usize },
    #[error("no labels to apply")]
    NoLabels,
    #[error("session registry unavailable")]
    SessionsUnavailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
