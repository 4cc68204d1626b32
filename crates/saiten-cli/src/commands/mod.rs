pub mod batch;
pub mod check;
pub mod grade;
pub mod init;
pub mod list_models;
pub mod stats;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Table};

use saiten_core::model::{CandidateAnswer, Problem};
use saiten_core::parser;
use saiten_core::results::{RuleDetail, RuleMetrics, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Inputs shared by `grade` and `check`.
#[derive(Debug, Args)]
pub struct AnswerArgs {
    /// Path to .toml problem set or directory
    #[arg(long)]
    pub problems: PathBuf,

    /// Problem id to grade against
    #[arg(long)]
    pub problem: String,

    /// Answer text
    #[arg(long, conflicts_with = "answer_file", required_unless_present = "answer_file")]
    pub answer: Option<String>,

    /// Read the answer text from a file
    #[arg(long)]
    pub answer_file: Option<PathBuf>,

    /// Rater id recorded with the verdict
    #[arg(long)]
    pub rater: Option<String>,
}

/// A resolved grading request.
pub struct GradingInput {
    /// Exam named by the problem set, if any.
    pub exam: Option<String>,
    pub problem: Problem,
    pub answer: CandidateAnswer,
}

impl AnswerArgs {
    pub fn load(&self) -> Result<GradingInput> {
        let sets = parser::load_problems(&self.problems)?;
        let (set, problem) = parser::find_problem(&sets, &self.problem).with_context(|| {
            format!(
                "problem '{}' not found in {}",
                self.problem,
                self.problems.display()
            )
        })?;

        let text = match (&self.answer, &self.answer_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read answer file: {}", path.display()))?
                .trim_end()
                .to_string(),
            (None, None) => anyhow::bail!("either --answer or --answer-file is required"),
        };

        let mut answer = CandidateAnswer::new(problem.id.clone(), text);
        if let Some(rater) = &self.rater {
            answer = answer.with_rater(rater.clone());
        }

        Ok(GradingInput {
            exam: set.exam.clone(),
            problem: problem.clone(),
            answer,
        })
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
    }
}

fn describe_metrics(metrics: &RuleMetrics) -> String {
    match metrics {
        RuleMetrics::CharacterLimit {
            char_count,
            char_limit,
            percentage,
        } => format!("{char_count}/{char_limit} chars ({percentage}%)"),
        RuleMetrics::CopyPaste {
            similarity,
            threshold,
        } => format!("{similarity}% overlap (limit {threshold}%)"),
        RuleMetrics::SentenceStructure { issues } if issues.is_empty() => "no issues".into(),
        RuleMetrics::SentenceStructure { issues } => issues.join(", "),
    }
}

/// One row per rule that ran, in evaluation order.
pub fn rule_table(details: &[RuleDetail]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Rule", "Result", "Detail"]);

    for detail in details {
        let result = if detail.error.is_some() {
            "error".to_string()
        } else if let Some(score) = detail.fixed_score {
            format!("fixed {score}")
        } else if detail.violated {
            format!(
                "flag ({})",
                detail.severity.map(severity_label).unwrap_or("medium")
            )
        } else {
            "pass".to_string()
        };

        let text = detail
            .error
            .clone()
            .or_else(|| detail.reason.clone())
            .or_else(|| detail.metrics.as_ref().map(describe_metrics))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![Cell::new(&detail.name), Cell::new(result), Cell::new(text)]);
    }

    table
}
