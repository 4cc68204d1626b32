//! The `saiten check` command.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use saiten_core::results::RuleEvaluationOutcome;
use saiten_core::rules::{summarize, RuleSummary};
use saiten_providers::config::load_config_from;

use super::{rule_table, AnswerArgs, OutputFormat};

#[derive(Serialize)]
struct CheckReport<'a> {
    problem_id: &'a str,
    summary: RuleSummary,
    outcome: &'a RuleEvaluationOutcome,
}

pub fn execute(input: AnswerArgs, config_path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let request = input.load()?;

    request.problem.validate()?;
    request.answer.validate_for(&request.problem)?;

    let outcome = config
        .rule_evaluator()
        .evaluate(&request.answer.text, &request.problem);
    let summary = summarize(&outcome);

    match format {
        OutputFormat::Json => {
            let report = CheckReport {
                problem_id: &request.problem.id,
                summary,
                outcome: &outcome,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Problem: {}", request.problem.label());
            println!("{}", rule_table(&outcome.details));
            println!("{}", summary.message);
        }
    }

    Ok(())
}
