//! Security risk intake: criterion fast-track, weighted framework scoring, and the
//! comments posted back to the issue tracker once a decision is taken.
//!
//! The decision core (`answer`, `criteria`, `scoring`, `state`, `comments`) is pure and
//! synchronous. Storage, query hydration, and the tracker client are the collaborators the
//! `service` composes for the HTTP `router`.

pub mod answer;
pub mod catalog;
pub mod comments;
pub mod criteria;
pub mod domain;
pub mod query;
pub mod router;
pub mod scoring;
pub mod selectors;
pub mod service;
pub mod state;
pub mod storage;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use answer::Answer;
pub use catalog::{Catalog, CatalogError};
pub use comments::{
    build_payload, criterion_acceptance_comment, criterion_review_comment, framework_comment,
    render_decision, CommentKind, DecisionMode, RenderedDecision, RiskPayload,
};
pub use criteria::{evaluate_criterion, ready_to_accept, CriterionEvaluation, CriterionStatus};
pub use domain::{
    AnswerSet, Band, CriterionDefinition, CriterionQuestion, CriterionSnapshot,
    FrameworkDefinition, FrameworkQuestion, FrameworkSnapshot, JustificationSet, OverrideRule,
    Progress, RiskDimension, TicketKey,
};
pub use query::IntakeQuery;
pub use router::intake_router;
pub use scoring::{compute_score_and_band, FrameworkScore, RiskContribution, RiskStage};
pub use selectors::WizardView;
pub use service::{
    DispatchOutcome, IntakeService, IntakeServiceError, SessionView, SubmissionReceipt,
};
pub use state::{CriterionOutcome, DecisionReducer, Rejection, WizardAction, WizardState};
pub use storage::{
    FileStore, IntakeStorage, KeyValueStore, MemoryStore, StorageError, StoreBackend,
};
pub use tracker::{
    HttpTrackerClient, NullTrackerClient, TrackerBackend, TrackerClient, TrackerError,
    UpsertRiskRequest, UpsertRiskResponse,
};
