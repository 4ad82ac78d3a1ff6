use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder rendered wherever an answer or justification is absent.
pub const ABSENT_MARK: &str = "—";

const AFFIRMATIVE: &[&str] = &["yes", "y", "si", "sí", "true", "1"];
const NEGATIVE: &[&str] = &["no", "n", "false", "0"];
const INDETERMINATE: &[&str] = &[
    "unknown",
    "no se",
    "no sé",
    "nose",
    "ns",
    "na",
    "null",
    "undefined",
];

/// Canonical three-valued answer recorded for every criterion or framework question.
///
/// Deserialization accepts any of the localized synonyms (`"Sí"`, `"No sé"`, `true`, `0`...)
/// and rejects values that do not normalize; serialization always emits the canonical
/// `"yes" | "no" | "unknown"` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "&'static str")]
pub enum Answer {
    Yes,
    No,
    Unknown,
}

impl Answer {
    /// Match a free-form string against the synonym tables.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        if AFFIRMATIVE.contains(&value.as_str()) {
            Some(Answer::Yes)
        } else if NEGATIVE.contains(&value.as_str()) {
            Some(Answer::No)
        } else if INDETERMINATE.contains(&value.as_str()) {
            Some(Answer::Unknown)
        } else {
            None
        }
    }

    /// Normalize an arbitrary JSON value. `None` means "unanswered", never an error.
    pub fn normalize(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(text) => Self::parse(text),
            Value::Bool(true) => Some(Answer::Yes),
            Value::Bool(false) => Some(Answer::No),
            Value::Number(number) => {
                let text = match (number.as_i64(), number.as_f64()) {
                    (Some(int), _) => int.to_string(),
                    (None, Some(float)) if float.fract() == 0.0 => format!("{float:.0}"),
                    _ => number.to_string(),
                };
                Self::parse(&text)
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Answer::Yes => "yes",
            Answer::No => "no",
            Answer::Unknown => "unknown",
        }
    }

    /// Whether this answer adds the question's weight under the given inversion setting.
    /// `Unknown` is risk-positive either way.
    pub const fn is_risk_positive(self, invert_logic: bool) -> bool {
        match self {
            Answer::Unknown => true,
            Answer::Yes => !invert_logic,
            Answer::No => invert_logic,
        }
    }

    /// Label used in framework comments.
    pub const fn spanish_label(self) -> &'static str {
        match self {
            Answer::Yes => "Sí",
            Answer::No => "No",
            Answer::Unknown => "No sé",
        }
    }

    /// Label used when listing criterion statements for review.
    pub const fn criterion_label(self) -> &'static str {
        match self {
            Answer::Yes => "Aplica",
            Answer::No => "No aplica",
            Answer::Unknown => "Duda",
        }
    }
}

impl TryFrom<Value> for Answer {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Answer::normalize(&value).ok_or_else(|| format!("unrecognized answer {value}"))
    }
}

impl From<Answer> for &'static str {
    fn from(value: Answer) -> Self {
        value.as_str()
    }
}

pub fn spanish_label(answer: Option<Answer>) -> &'static str {
    answer.map(Answer::spanish_label).unwrap_or(ABSENT_MARK)
}

pub fn criterion_label(answer: Option<Answer>) -> &'static str {
    answer.map(Answer::criterion_label).unwrap_or(ABSENT_MARK)
}
