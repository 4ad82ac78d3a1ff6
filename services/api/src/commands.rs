use clap::Args;
use risk_intake::error::AppError;
use risk_intake::workflows::security::scoring::contributing_questions;
use risk_intake::workflows::security::{
    compute_score_and_band, render_decision, Answer, AnswerSet, Catalog, FrameworkScore,
    RenderedDecision, WizardState,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// JSON object mapping framework question ids to answers ("yes", "No sé", true...)
    #[arg(long)]
    answers: PathBuf,
    /// Catalog JSON to score against (defaults to the built-in catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CommentArgs {
    /// Wizard state JSON as returned by the intake API
    #[arg(long)]
    state: PathBuf,
    /// Catalog JSON the state was built from (defaults to the built-in catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    let answers = read_answers(&args.answers)?;
    let scored = compute_score_and_band(&answers, &catalog.framework);
    render_score(&catalog, &answers, &scored);
    Ok(())
}

pub(crate) fn run_comment(args: CommentArgs) -> Result<(), AppError> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    let raw = fs::read_to_string(&args.state)?;
    let state: WizardState = serde_json::from_str(&raw)?;

    match comment_for_state(&catalog, &state) {
        Some(rendered) => println!("{}", rendered.comment),
        None => println!("No decision recorded for {} yet.", display_ticket(&state)),
    }
    Ok(())
}

fn display_ticket(state: &WizardState) -> &str {
    if state.ticket_key.is_empty() {
        "this state"
    } else {
        &state.ticket_key
    }
}

pub(crate) fn comment_for_state(catalog: &Catalog, state: &WizardState) -> Option<RenderedDecision> {
    render_decision(catalog, state)
}

/// Answers that do not normalize are skipped with a warning.
pub(crate) fn parse_answers(raw: &str) -> Result<AnswerSet, AppError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(entries) = value else {
        return Err(AppError::Input(
            "answers file must contain a JSON object".to_string(),
        ));
    };

    Ok(entries
        .into_iter()
        .filter_map(|(qid, value)| match Answer::normalize(&value) {
            Some(answer) => Some((qid, answer)),
            None => {
                warn!(question = %qid, %value, "ignoring unrecognized answer");
                None
            }
        })
        .collect())
}

fn read_answers(path: &Path) -> Result<AnswerSet, AppError> {
    let raw = fs::read_to_string(path)?;
    parse_answers(&raw)
}

fn render_score(catalog: &Catalog, answers: &AnswerSet, scored: &FrameworkScore) {
    println!("Security risk framework");
    println!(
        "{}: {} ({} pts)",
        scored.stage().label(),
        scored.band,
        scored.score
    );
    println!(
        "Answered {}/{} questions",
        scored.answered_count, scored.total_questions
    );

    if !scored.applied_rules.is_empty() {
        println!("Override rules applied: {}", scored.applied_rules.join(", "));
    }

    let contributions = contributing_questions(&catalog.framework, answers);
    if contributions.is_empty() {
        println!("\nRisk contributions: none");
    } else {
        println!("\nRisk contributions");
        for contribution in contributions {
            println!(
                "- [{}] {} (+{}) answered {}",
                contribution.id,
                contribution.text,
                contribution.weight,
                contribution.answer.spanish_label()
            );
        }
    }
}
