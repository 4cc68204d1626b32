//! The `saiten grade` command.

use std::path::PathBuf;

use anyhow::Result;

use saiten_core::engine::GradingOrchestrator;
use saiten_core::model::Problem;
use saiten_core::results::{GradingVerdict, VerdictSource};
use saiten_providers::config::load_config_from;

use super::{rule_table, AnswerArgs, OutputFormat};

pub async fn execute(
    input: AnswerArgs,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let request = input.load()?;

    let provider = config.build_provider(provider.as_deref())?;
    let orchestrator = GradingOrchestrator::new(provider, config.grader_config(model.as_deref()))
        .with_evaluator(config.rule_evaluator())
        .with_prompt_builder(config.prompt_builder(request.exam.as_deref()));

    let verdict = orchestrator.grade(&request.answer, &request.problem).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
        OutputFormat::Text => print_verdict(&request.problem, &verdict),
    }

    Ok(())
}

fn print_verdict(problem: &Problem, verdict: &GradingVerdict) {
    let source = match verdict.source {
        VerdictSource::Rule => "rule",
        VerdictSource::Model => "model",
    };

    println!("Problem: {}", problem.label());
    println!("Score:   {} ({source})", verdict.score);
    println!("Reason:  {}", verdict.reason);

    if !verdict.feedback.positive.is_empty() {
        println!("\nGood points:");
        for point in &verdict.feedback.positive {
            println!("  + {point}");
        }
    }
    if !verdict.feedback.negative.is_empty() {
        println!("\nTo improve:");
        for point in &verdict.feedback.negative {
            println!("  - {point}");
        }
    }

    if !verdict.rule_details.is_empty() {
        println!("\n{}", rule_table(&verdict.rule_details));
    }

    let meta = &verdict.metadata;
    if !meta.json_valid {
        eprintln!("Warning: model output could not be parsed; the default verdict was used.");
    }
    if let Some(model) = &meta.model {
        let tokens = meta.token_usage.map(|u| u.total_tokens).unwrap_or(0);
        eprintln!("\n{model}: {tokens} tokens, {}ms", meta.latency_ms);
    }
}
