use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::answer::Answer;
use super::scoring::{default_bands, default_rules};

/// Answers keyed by question identifier; only answered questions carry an entry.
pub type AnswerSet = BTreeMap<String, Answer>;

/// Free-text justifications keyed by question identifier.
pub type JustificationSet = BTreeMap<String, String>;

fn ticket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]+-\d+$").expect("ticket pattern compiles"))
}

/// Upper-cases and trims a raw ticket key without validating it.
pub fn normalize_ticket_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// `PROJECT-NUMBER`, checked after upper-casing.
pub fn is_valid_ticket_key(raw: &str) -> bool {
    ticket_pattern().is_match(&normalize_ticket_key(raw))
}

/// Validated issue-tracker key such as `CS-201`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketKey(String);

impl TicketKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let key = normalize_ticket_key(raw);
        ticket_pattern().is_match(&key).then_some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statement belonging to a predefined criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionQuestion {
    pub id: String,
    #[serde(default)]
    pub text: String,
    /// Answers for which the user must explain themselves before acceptance.
    #[serde(default)]
    pub requires_justification_when: Vec<Answer>,
}

impl CriterionQuestion {
    pub fn requires_justification(&self, answer: Answer) -> bool {
        self.requires_justification_when.contains(&answer)
    }
}

/// Self-contained rule set that can fast-track a risk decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<CriterionQuestion>,
}

/// Whether a framework question measures how likely or how damaging a risk is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskDimension {
    #[serde(alias = "Likelihood")]
    Likelihood,
    #[serde(alias = "Impact")]
    Impact,
}

/// Weighted question of the general risk framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkQuestion {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub weight: f64,
    /// When set, `no` is the risky answer (protective controls).
    #[serde(default)]
    pub invert_logic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<RiskDimension>,
}

/// Labeled, inclusive score interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    pub label: String,
}

impl Band {
    pub fn new(min: f64, max: f64, label: impl Into<String>) -> Self {
        Self {
            min,
            max,
            label: label.into(),
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

/// Adjustment applied to the raw weighted sum before the band lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideRule {
    /// Raise the score to the minimum of `floor_band` when `trigger` and at least one of
    /// `any_of` were answered `yes` or `unknown`.
    MinimumBand {
        name: String,
        trigger: String,
        any_of: Vec<String>,
        floor_band: String,
    },
}

impl OverrideRule {
    pub fn name(&self) -> &str {
        match self {
            OverrideRule::MinimumBand { name, .. } => name,
        }
    }
}

/// General weighted questionnaire used when no criterion applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub questions: Vec<FrameworkQuestion>,
    #[serde(default = "default_bands")]
    pub bands: Vec<Band>,
    #[serde(default = "default_rules")]
    pub rules: Vec<OverrideRule>,
}

impl FrameworkDefinition {
    pub fn question(&self, id: &str) -> Option<&FrameworkQuestion> {
        self.questions.iter().find(|question| question.id == id)
    }
}

/// Answers and justifications frozen when a criterion is accepted or sent to review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionSnapshot {
    pub definition: CriterionDefinition,
    #[serde(default)]
    pub answers: AnswerSet,
    #[serde(default)]
    pub justifications: JustificationSet,
}

/// Framework answers frozen together with the score computed from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkSnapshot {
    pub definition: FrameworkDefinition,
    pub answers: AnswerSet,
    pub score: f64,
    pub band: String,
    pub complete: bool,
}

/// Answered share of a question list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    pub fn new(answered: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0
        } else {
            ((answered as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            answered,
            total,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_keys_are_upper_cased_before_validation() {
        assert!(is_valid_ticket_key("CS-201"));
        assert!(is_valid_ticket_key("cs-201"));
        assert!(is_valid_ticket_key(" sec2-7 "));
        assert!(!is_valid_ticket_key("CSSAS"));
        assert!(!is_valid_ticket_key("C-1"));
        assert!(!is_valid_ticket_key("2CS-1"));
        assert!(!is_valid_ticket_key("CS-"));

        let key = TicketKey::parse("cs-201").expect("valid key");
        assert_eq!(key.as_str(), "CS-201");
        assert!(TicketKey::parse("bad key").is_none());
    }

    #[test]
    fn progress_rounds_to_whole_percent() {
        assert_eq!(Progress::new(0, 0).percent, 0);
        assert_eq!(Progress::new(1, 3).percent, 33);
        assert_eq!(Progress::new(2, 3).percent, 67);
        assert_eq!(Progress::new(8, 8).percent, 100);
    }

    #[test]
    fn framework_definition_defaults_bands_and_rules() {
        let definition: FrameworkDefinition = serde_json::from_str(
            r#"{ "questions": [{ "id": "1", "weight": 3, "dimension": "Likelihood" }] }"#,
        )
        .expect("parses");
        assert_eq!(definition.bands.len(), 4);
        assert_eq!(definition.rules.len(), 1);
        assert_eq!(
            definition.questions[0].dimension,
            Some(RiskDimension::Likelihood)
        );
        assert!(!definition.questions[0].invert_logic);
    }
}
