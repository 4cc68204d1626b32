//! Custom rule example: register an extra rule and run answers through it.
//!
//! Adds a rule that fixes the score to ✕ for answers that give up ("わからない"
//! and friends), ahead of the built-in checks, then evaluates a few answers
//! against the first problem of a problem set.
//!
//! ```bash
//! cargo run -p saiten-core --example custom_rule -- problem-sets/pm-sample.toml
//! ```

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use saiten_core::error::RuleError;
use saiten_core::model::{Problem, Score};
use saiten_core::parser;
use saiten_core::results::{RuleCheckResult, Severity};
use saiten_core::rules::{summarize, RuleEvaluator};

const GIVE_UP_PHRASES: &[&str] = &["わからない", "分からない", "不明", "知らない"];

fn no_give_up(answer: &str, _problem: &Problem) -> Result<RuleCheckResult, RuleError> {
    let hits: Vec<&str> = GIVE_UP_PHRASES
        .iter()
        .copied()
        .filter(|phrase| answer.contains(phrase))
        .collect();

    Ok(match hits.len() {
        0 => RuleCheckResult::pass(None),
        _ if answer.chars().count() < 15 => {
            RuleCheckResult::fix(Score::Poor, format!("Answer gives up: {}", hits.join(", ")))
        }
        _ => RuleCheckResult::flag(
            Severity::Low,
            format!("Answer hedges with: {}", hits.join(", ")),
        ),
    })
}

fn main() -> anyhow::Result<()> {
    let path = env::args()
        .nth(1)
        .context("Usage: custom_rule <problem-set.toml>")?;

    let set = parser::parse_problem_set(Path::new(&path))?;
    let problem = set
        .problems
        .first()
        .with_context(|| format!("{path} has no problems"))?;
    println!("Problem: {} ({} chars max)", problem.id, problem.constraints.char_limit);

    let mut evaluator = RuleEvaluator::new();
    evaluator.add_custom_rule(
        "no_give_up",
        "Give-up detection",
        "Fix the score to ✕ for answers that decline to answer",
        Some(0),
        Arc::new(no_give_up),
    )?;

    println!("\nRules in evaluation order:");
    for rule in evaluator.rules() {
        println!("  {:>3}  {:<22} {}", rule.priority, rule.id, rule.name);
    }

    let answers = [
        "わからない。".to_string(),
        "不明な点は残るが、利用部門を早期に巻き込み合意を得る。".to_string(),
        problem.model_answer.clone(),
        "週次で進捗会議を開き、課題の担当者と期限を明確にする。".to_string(),
    ];

    println!();
    for answer in &answers {
        let outcome = evaluator.evaluate(answer, problem);
        let summary = summarize(&outcome);
        println!("{answer}");
        println!("  -> {:?}: {}\n", summary.status, summary.message);
    }

    Ok(())
}
