//! Derived views over [`WizardState`]: nothing here is stored, everything is recomputed.

use serde::Serialize;

use super::catalog::Catalog;
use super::criteria::{criterion_progress, evaluate_criterion, ready_to_accept, CriterionEvaluation};
use super::domain::{CriterionDefinition, Progress};
use super::scoring::{compute_score_and_band, FrameworkScore, RiskStage};
use super::state::{CriterionOutcome, WizardState};

pub fn selected_criterion<'a>(
    catalog: &'a Catalog,
    state: &WizardState,
) -> Option<&'a CriterionDefinition> {
    state
        .selected_criterion_id
        .as_deref()
        .and_then(|id| catalog.criterion(id))
}

pub fn selected_evaluation(catalog: &Catalog, state: &WizardState) -> CriterionEvaluation {
    match selected_criterion(catalog, state) {
        Some(criterion) => evaluate_criterion(criterion, &state.criterion_answers),
        None => CriterionEvaluation::pending(),
    }
}

pub fn selected_ready_to_accept(catalog: &Catalog, state: &WizardState) -> bool {
    let Some(criterion) = selected_criterion(catalog, state) else {
        return false;
    };
    let evaluation = evaluate_criterion(criterion, &state.criterion_answers);
    ready_to_accept(
        criterion,
        &evaluation,
        &state.criterion_answers,
        &state.criterion_justifications,
    )
}

pub fn framework_score(catalog: &Catalog, state: &WizardState) -> FrameworkScore {
    compute_score_and_band(&state.framework_answers, &catalog.framework)
}

pub fn show_framework(state: &WizardState) -> bool {
    state.ticket_confirmed && state.criterion_outcome == CriterionOutcome::Fail
}

pub fn framework_ready(state: &WizardState, all_answered: bool) -> bool {
    show_framework(state) && all_answered
}

pub fn can_show_execution(state: &WizardState, framework_ready: bool) -> bool {
    state.ticket_confirmed
        && match state.criterion_outcome {
            CriterionOutcome::Pass => true,
            CriterionOutcome::Fail => framework_ready,
            CriterionOutcome::Pending => false,
        }
}

pub fn decision_ready(state: &WizardState, framework_ready: bool) -> bool {
    can_show_execution(state, framework_ready)
}

pub fn show_actions(state: &WizardState, has_selection: bool, decision_ready: bool) -> bool {
    state.ticket_confirmed && !has_selection && decision_ready
}

pub fn show_back(state: &WizardState, has_selection: bool, show_execution: bool) -> bool {
    state.ticket_confirmed
        && (has_selection || state.criterion_outcome == CriterionOutcome::Fail || show_execution)
}

/// Flow booleans a front end needs to decide which step to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowFlags {
    pub show_framework: bool,
    pub framework_ready: bool,
    pub can_show_execution: bool,
    pub decision_ready: bool,
    pub show_actions: bool,
    pub show_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedCriterionView {
    pub id: String,
    pub title: String,
    pub evaluation: CriterionEvaluation,
    pub ready_to_accept: bool,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameworkView {
    pub score: FrameworkScore,
    pub stage: RiskStage,
    pub stage_label: &'static str,
    pub progress: Progress,
}

/// Everything derivable from one state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<SelectedCriterionView>,
    pub framework: FrameworkView,
    pub flow: FlowFlags,
}

pub fn wizard_view(catalog: &Catalog, state: &WizardState) -> WizardView {
    let selected = selected_criterion(catalog, state).map(|criterion| {
        let evaluation = evaluate_criterion(criterion, &state.criterion_answers);
        SelectedCriterionView {
            id: criterion.id.clone(),
            title: criterion.title.clone(),
            ready_to_accept: ready_to_accept(
                criterion,
                &evaluation,
                &state.criterion_answers,
                &state.criterion_justifications,
            ),
            progress: criterion_progress(criterion, &state.criterion_answers),
            evaluation,
        }
    });

    let score = framework_score(catalog, state);
    let progress = Progress::new(score.answered_count, score.total_questions);
    let stage = score.stage();
    let framework_ready = framework_ready(state, score.is_complete());
    let execution = can_show_execution(state, framework_ready);
    let has_selection = selected.is_some();
    let decision_ready = decision_ready(state, framework_ready);

    WizardView {
        flow: FlowFlags {
            show_framework: show_framework(state),
            framework_ready,
            can_show_execution: execution,
            decision_ready,
            show_actions: show_actions(state, has_selection, decision_ready),
            show_back: show_back(state, has_selection, execution),
        },
        framework: FrameworkView {
            score,
            stage,
            stage_label: stage.label(),
            progress,
        },
        selected,
    }
}
