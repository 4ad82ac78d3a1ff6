//! Tracker comments and the JSON payload rendered from a finalized decision.
//!
//! Section headers and bullet prefixes are consumed by the tracker's markdown renderer and
//! must stay byte-for-byte stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::{criterion_label, spanish_label, Answer, ABSENT_MARK};
use super::catalog::Catalog;
use super::domain::{
    AnswerSet, CriterionDefinition, CriterionSnapshot, FrameworkDefinition, FrameworkSnapshot,
    JustificationSet,
};
use super::scoring::{contributing_questions, snapshot_framework, RiskContribution};
use super::state::{CriterionOutcome, WizardState};

const REVIEW_BANNER: &str = "Se requiere **revisión del criterio de ciberseguridad**. **No se acepta el criterio** hasta resolver la revisión.";

fn trimmed_notes(notes: Option<&str>) -> Option<&str> {
    notes.map(str::trim).filter(|text| !text.is_empty())
}

fn justification<'a>(justifications: &'a JustificationSet, qid: &str) -> &'a str {
    justifications.get(qid).map(|text| text.trim()).unwrap_or("")
}

/// Comment requesting the accepted criterion be applied; only `yes` statements are listed.
pub fn criterion_acceptance_comment(
    definition: &CriterionDefinition,
    answers: &AnswerSet,
    justifications: &JustificationSet,
    notes: Option<&str>,
) -> String {
    let lines = definition
        .questions
        .iter()
        .filter(|question| answers.get(&question.id) == Some(&Answer::Yes))
        .map(|question| {
            let text = justification(justifications, &question.id);
            let text = if text.is_empty() { ABSENT_MARK } else { text };
            format!("- {}\n  {}", question.text, text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut blocks = vec![
        format!(
            "Solicito aplicar el **criterio de ciberseguridad**: {}.",
            definition.title
        ),
        "Respuestas y justificaciones:".to_string(),
        if lines.trim().is_empty() {
            ABSENT_MARK.to_string()
        } else {
            lines
        },
    ];
    if let Some(notes) = trimmed_notes(notes) {
        blocks.push(format!("Notas: {notes}"));
    }
    blocks.join("\n\n")
}

/// Comment flagging a criterion for review: every statement with its answer label.
pub fn criterion_review_comment(
    definition: &CriterionDefinition,
    answers: &AnswerSet,
    justifications: &JustificationSet,
    notes: Option<&str>,
) -> String {
    let body = definition
        .questions
        .iter()
        .map(|question| {
            let mut lines = vec![
                format!("- {}", question.text),
                format!(
                    "  - Respuesta: **{}**",
                    criterion_label(answers.get(&question.id).copied())
                ),
            ];
            let text = justification(justifications, &question.id);
            if !text.is_empty() {
                lines.push(format!("  - Justificación: {text}"));
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let notes = trimmed_notes(notes)
        .map(|notes| format!("\n\n**Notas adicionales:**\n{notes}"))
        .unwrap_or_default();

    format!(
        "{REVIEW_BANNER}\n\n**Criterio:** {}\n\n{body}{notes}",
        definition.title
    )
}

/// Comment registering the computed framework risk and the answers that produced it.
pub fn framework_comment(
    definition: &FrameworkDefinition,
    answers: &AnswerSet,
    score: f64,
    band: &str,
    complete: bool,
    notes: Option<&str>,
) -> String {
    let lines = contributing_questions(definition, answers)
        .iter()
        .map(|contribution| {
            format!(
                "- {} (+{})\n  Respuesta: {}",
                contribution.text,
                contribution.weight,
                spanish_label(Some(contribution.answer))
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut blocks = vec![
        "Solicito registrar el **Security Risk** calculado.".to_string(),
        format!("Nivel: **{band}** ({score} pts)."),
        if complete {
            "Todas las preguntas del framework fueron respondidas.".to_string()
        } else {
            "Aún hay preguntas sin responder.".to_string()
        },
        "Respuestas que aportan riesgo:".to_string(),
        if lines.is_empty() {
            ABSENT_MARK.to_string()
        } else {
            lines
        },
    ];
    if let Some(notes) = trimmed_notes(notes) {
        blocks.push(format!("Notas: {notes}"));
    }
    blocks.join("\n\n")
}

/// Which decision a rendered comment documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    CriterionAcceptance,
    CriterionReview,
    Framework,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Criterion,
    Framework,
    Pending,
}

impl CommentKind {
    pub const fn mode(self) -> DecisionMode {
        match self {
            CommentKind::CriterionAcceptance | CommentKind::CriterionReview => {
                DecisionMode::Criterion
            }
            CommentKind::Framework => DecisionMode::Framework,
        }
    }
}

/// Comment text plus the snapshot it was rendered from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDecision {
    pub kind: CommentKind,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criterion: Option<CriterionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkSnapshot>,
}

/// Render the comment for whatever decision the state currently records.
///
/// An accepted criterion wins over a pending review; the framework comment is only
/// produced once the fast-track was skipped.
pub fn render_decision(catalog: &Catalog, state: &WizardState) -> Option<RenderedDecision> {
    let notes = Some(state.notes.as_str());

    if let Some(snapshot) = &state.accepted_snapshot {
        return Some(RenderedDecision {
            kind: CommentKind::CriterionAcceptance,
            comment: criterion_acceptance_comment(
                &snapshot.definition,
                &snapshot.answers,
                &snapshot.justifications,
                notes,
            ),
            criterion: Some(snapshot.clone()),
            framework: None,
        });
    }

    if state.criterion_review_requested {
        if let Some(snapshot) = &state.review_snapshot {
            return Some(RenderedDecision {
                kind: CommentKind::CriterionReview,
                comment: criterion_review_comment(
                    &snapshot.definition,
                    &snapshot.answers,
                    &snapshot.justifications,
                    notes,
                ),
                criterion: Some(snapshot.clone()),
                framework: None,
            });
        }
    }

    if state.criterion_outcome == CriterionOutcome::Fail {
        let snapshot = snapshot_framework(&catalog.framework, &state.framework_answers);
        return Some(RenderedDecision {
            kind: CommentKind::Framework,
            comment: framework_comment(
                &snapshot.definition,
                &snapshot.answers,
                snapshot.score,
                &snapshot.band,
                snapshot.complete,
                notes,
            ),
            criterion: None,
            framework: Some(snapshot),
        });
    }

    None
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDecision {
    pub used: String,
    pub title: String,
    pub answers: AnswerSet,
    pub justifications: JustificationSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkDecision {
    pub score: f64,
    pub level: String,
    pub answers: AnswerSet,
    pub all_answered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSection {
    pub mode: DecisionMode,
    pub by_criterion: Option<CriterionDecision>,
    pub by_framework: Option<FrameworkDecision>,
}

/// Structured record of a decision for archival or backend consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPayload {
    pub ticket: String,
    pub decision: DecisionSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub rationale: Vec<RiskContribution>,
    pub generated_at: DateTime<Utc>,
}

pub fn build_payload(
    ticket: &str,
    mode: DecisionMode,
    criterion: Option<&CriterionSnapshot>,
    framework: Option<&FrameworkSnapshot>,
    notes: Option<&str>,
    generated_at: DateTime<Utc>,
) -> RiskPayload {
    let rationale = framework
        .map(|snapshot| contributing_questions(&snapshot.definition, &snapshot.answers))
        .unwrap_or_default();

    let by_criterion = match (mode, criterion) {
        (DecisionMode::Criterion, Some(snapshot)) => Some(CriterionDecision {
            used: snapshot.definition.id.clone(),
            title: snapshot.definition.title.clone(),
            answers: snapshot.answers.clone(),
            justifications: snapshot.justifications.clone(),
        }),
        _ => None,
    };

    let by_framework = match (mode, framework) {
        (DecisionMode::Framework, Some(snapshot)) => Some(FrameworkDecision {
            score: snapshot.score,
            level: snapshot.band.clone(),
            answers: snapshot.answers.clone(),
            all_answered: snapshot.complete,
        }),
        _ => None,
    };

    RiskPayload {
        ticket: ticket.trim().to_string(),
        decision: DecisionSection {
            mode,
            by_criterion,
            by_framework,
        },
        notes: notes.map(str::to_string),
        rationale,
        generated_at,
    }
}
