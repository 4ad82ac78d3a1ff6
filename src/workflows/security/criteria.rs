use serde::{Deserialize, Serialize};

use super::answer::Answer;
use super::domain::{AnswerSet, CriterionDefinition, JustificationSet, Progress};

/// Outcome of evaluating the answers given to a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Pending,
    Pass,
    Fail,
    Review,
}

impl CriterionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CriterionStatus::Pending => "PENDIENTE",
            CriterionStatus::Pass => "PASA",
            CriterionStatus::Fail => "NO PASA",
            CriterionStatus::Review => "REVISAR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CriterionEvaluation {
    pub status: CriterionStatus,
    pub label: &'static str,
    pub all_yes: bool,
}

impl CriterionEvaluation {
    pub const fn pending() -> Self {
        Self::from_status(CriterionStatus::Pending, false)
    }

    const fn from_status(status: CriterionStatus, all_yes: bool) -> Self {
        Self {
            status,
            label: status.label(),
            all_yes,
        }
    }
}

/// Decide pass / fail / review for one criterion.
///
/// Justifications never influence the status; they only gate [`ready_to_accept`].
pub fn evaluate_criterion(definition: &CriterionDefinition, answers: &AnswerSet) -> CriterionEvaluation {
    let given: Vec<Answer> = definition
        .questions
        .iter()
        .filter_map(|question| answers.get(&question.id).copied())
        .collect();

    if given.is_empty() {
        return CriterionEvaluation::pending();
    }

    let complete = given.len() == definition.questions.len();
    let all_yes = complete && given.iter().all(|answer| *answer == Answer::Yes);

    let status = if all_yes {
        CriterionStatus::Pass
    } else if complete && given.contains(&Answer::Unknown) {
        CriterionStatus::Review
    } else if given.contains(&Answer::No) {
        CriterionStatus::Fail
    } else {
        CriterionStatus::Pending
    };

    CriterionEvaluation::from_status(status, all_yes)
}

/// A passing criterion can only be accepted once every justification it prompted for is
/// filled in.
pub fn ready_to_accept(
    definition: &CriterionDefinition,
    evaluation: &CriterionEvaluation,
    answers: &AnswerSet,
    justifications: &JustificationSet,
) -> bool {
    if evaluation.status != CriterionStatus::Pass {
        return false;
    }

    definition.questions.iter().all(|question| {
        let Some(answer) = answers.get(&question.id).copied() else {
            return true;
        };
        if answer != Answer::Yes || !question.requires_justification(Answer::Yes) {
            return true;
        }
        justifications
            .get(&question.id)
            .is_some_and(|text| !text.trim().is_empty())
    })
}

pub fn criterion_progress(definition: &CriterionDefinition, answers: &AnswerSet) -> Progress {
    let answered = definition
        .questions
        .iter()
        .filter(|question| answers.contains_key(&question.id))
        .count();
    Progress::new(answered, definition.questions.len())
}
