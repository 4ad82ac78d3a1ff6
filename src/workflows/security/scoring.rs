use serde::{Deserialize, Serialize};
use tracing::debug;

use super::answer::Answer;
use super::domain::{
    AnswerSet, Band, FrameworkDefinition, FrameworkQuestion, FrameworkSnapshot, OverrideRule,
};

pub const EXPOSED_AND_SENSITIVE_MIN_HIGH: &str = "EXPOSED_AND_SENSITIVE_MIN_HIGH";

/// Floor used when a minimum-band rule names a band the table does not define.
pub const DEFAULT_HIGH_FLOOR: f64 = 9.0;

const HIGH_BAND_ALIASES: &[&str] = &["alto", "high"];

pub fn default_bands() -> Vec<Band> {
    vec![
        Band::new(0.0, 4.0, "Bajo"),
        Band::new(5.0, 8.0, "Medio"),
        Band::new(9.0, 12.0, "Alto"),
        Band::new(13.0, 20.0, "Crítico"),
    ]
}

/// Exposure (question 1) combined with sensitive data or a critical system (2, 3 or 4)
/// never scores below the high band.
pub fn default_rules() -> Vec<OverrideRule> {
    vec![OverrideRule::MinimumBand {
        name: EXPOSED_AND_SENSITIVE_MIN_HIGH.to_string(),
        trigger: "1".to_string(),
        any_of: vec!["2".to_string(), "3".to_string(), "4".to_string()],
        floor_band: "Alto".to_string(),
    }]
}

/// Result of scoring a set of framework answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameworkScore {
    pub score: f64,
    pub band: String,
    pub answered_count: usize,
    pub total_questions: usize,
    /// Names of the override rules that raised the score.
    pub applied_rules: Vec<String>,
}

impl FrameworkScore {
    pub fn is_complete(&self) -> bool {
        self.answered_count == self.total_questions
    }

    pub fn stage(&self) -> RiskStage {
        if self.is_complete() {
            RiskStage::Final
        } else {
            RiskStage::Temporary
        }
    }
}

/// Whether the band is still advisory (unanswered questions remain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStage {
    Temporary,
    Final,
}

impl RiskStage {
    pub const fn label(self) -> &'static str {
        match self {
            RiskStage::Temporary => "Riesgo temporal",
            RiskStage::Final => "Riesgo FINAL",
        }
    }
}

/// Question that added its weight to the score, kept for comments and payload rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    pub id: String,
    pub text: String,
    pub weight: f64,
    pub answer: Answer,
}

pub fn contributes_risk(question: &FrameworkQuestion, answer: Option<Answer>) -> bool {
    answer.is_some_and(|answer| answer.is_risk_positive(question.invert_logic))
}

pub fn compute_score_and_band(answers: &AnswerSet, framework: &FrameworkDefinition) -> FrameworkScore {
    let mut score = 0.0;
    let mut answered_count = 0;

    for question in &framework.questions {
        let answer = answers.get(&question.id).copied();
        if answer.is_some() {
            answered_count += 1;
        }
        if contributes_risk(question, answer) {
            score += question.weight.max(0.0);
        }
    }

    let bands: &[Band] = &framework.bands;
    let fallback;
    let bands = if bands.is_empty() {
        fallback = default_bands();
        &fallback[..]
    } else {
        bands
    };

    let mut applied_rules = Vec::new();
    for rule in &framework.rules {
        if let Some(floor) = rule_floor(rule, answers, bands) {
            if score < floor {
                debug!(rule = rule.name(), raw = score, floor, "override raised framework score");
                score = floor;
                applied_rules.push(rule.name().to_string());
            }
        }
    }

    FrameworkScore {
        band: band_for_score(bands, score).to_string(),
        score,
        answered_count,
        total_questions: framework.questions.len(),
        applied_rules,
    }
}

/// Band holding `score`. A score between two bands resolves to the lower one, a score
/// past the last band to the last, and a score below every band to the lowest.
pub fn band_for_score(bands: &[Band], score: f64) -> &str {
    if let Some(band) = bands.iter().find(|band| band.contains(score)) {
        return &band.label;
    }

    let reached = bands
        .iter()
        .filter(|band| band.min <= score)
        .max_by(|a, b| a.min.total_cmp(&b.min));
    let lowest = || bands.iter().min_by(|a, b| a.min.total_cmp(&b.min));
    reached
        .or_else(lowest)
        .map(|band| band.label.as_str())
        .unwrap_or_default()
}

/// Band named `label`, case-insensitively; "Alto" and "High" name the same band.
pub fn find_band<'a>(bands: &'a [Band], label: &str) -> Option<&'a Band> {
    let wanted = label.to_lowercase();
    let is_high = HIGH_BAND_ALIASES.contains(&wanted.as_str());
    bands.iter().find(|band| {
        let candidate = band.label.to_lowercase();
        candidate == wanted || (is_high && HIGH_BAND_ALIASES.contains(&candidate.as_str()))
    })
}

fn rule_floor(rule: &OverrideRule, answers: &AnswerSet, bands: &[Band]) -> Option<f64> {
    match rule {
        OverrideRule::MinimumBand {
            trigger,
            any_of,
            floor_band,
            ..
        } => {
            let exposed = |id: &String| {
                matches!(answers.get(id), Some(Answer::Yes) | Some(Answer::Unknown))
            };
            if exposed(trigger) && any_of.iter().any(exposed) {
                Some(band_floor(bands, floor_band))
            } else {
                None
            }
        }
    }
}

fn band_floor(bands: &[Band], label: &str) -> f64 {
    find_band(bands, label)
        .map(|band| band.min)
        .unwrap_or(DEFAULT_HIGH_FLOOR)
}

/// Questions whose answers added risk, in definition order.
pub fn contributing_questions(
    framework: &FrameworkDefinition,
    answers: &AnswerSet,
) -> Vec<RiskContribution> {
    framework
        .questions
        .iter()
        .filter_map(|question| {
            let answer = answers.get(&question.id).copied()?;
            contributes_risk(question, Some(answer)).then(|| RiskContribution {
                id: question.id.clone(),
                text: question.text.clone(),
                weight: question.weight,
                answer,
            })
        })
        .collect()
}

pub fn snapshot_framework(framework: &FrameworkDefinition, answers: &AnswerSet) -> FrameworkSnapshot {
    let scored = compute_score_and_band(answers, framework);
    FrameworkSnapshot {
        definition: framework.clone(),
        answers: answers.clone(),
        complete: scored.is_complete(),
        score: scored.score,
        band: scored.band,
    }
}
