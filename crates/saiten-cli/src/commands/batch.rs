//! The `saiten batch` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use saiten_core::engine::GradingOrchestrator;
use saiten_core::history::HistoryEntry;
use saiten_core::model::{CandidateAnswer, Problem, ProblemSet, Score};
use saiten_core::parser;
use saiten_providers::config::load_config_from;

/// One answer's outcome: a history entry or the reason it failed.
#[derive(Debug, Serialize)]
struct BatchItem {
    index: usize,
    problem_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BatchItem {
    fn failed(index: usize, problem_id: &str, error: String) -> Self {
        Self {
            index,
            problem_id: problem_id.to_string(),
            entry: None,
            error: Some(error),
        }
    }
}

/// The exam name shared by every loaded set, if they agree on one.
fn common_exam(sets: &[ProblemSet]) -> Option<&str> {
    let first = sets.first()?.exam.as_deref()?;
    sets.iter()
        .all(|s| s.exam.as_deref() == Some(first))
        .then_some(first)
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    problems_path: PathBuf,
    answers_path: PathBuf,
    output: Option<PathBuf>,
    parallelism: usize,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    let config = load_config_from(config_path.as_deref())?;
    let sets = parser::load_problems(&problems_path)?;

    let content = std::fs::read_to_string(&answers_path)
        .with_context(|| format!("failed to read answers: {}", answers_path.display()))?;
    let answers: Vec<CandidateAnswer> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse answers: {}", answers_path.display()))?;

    let mut items: Vec<Option<BatchItem>> = Vec::with_capacity(answers.len());
    let mut jobs: Vec<(CandidateAnswer, Problem)> = Vec::new();
    let mut job_index = Vec::new();

    for (index, answer) in answers.into_iter().enumerate() {
        match parser::find_problem(&sets, &answer.problem_id) {
            Some((_, problem)) => {
                job_index.push(index);
                jobs.push((answer, problem.clone()));
                items.push(None);
            }
            None => {
                let message = format!("unknown problem id '{}'", answer.problem_id);
                items.push(Some(BatchItem::failed(index, &answer.problem_id, message)));
            }
        }
    }

    let provider = config.build_provider(provider.as_deref())?;
    let orchestrator = GradingOrchestrator::new(provider, config.grader_config(model.as_deref()))
        .with_evaluator(config.rule_evaluator())
        .with_prompt_builder(config.prompt_builder(common_exam(&sets)));

    eprintln!(
        "Grading {} answers with {} (parallelism {parallelism})",
        jobs.len(),
        orchestrator.config().model
    );
    let results = orchestrator.grade_batch(&jobs, parallelism).await;

    for ((index, (answer, _)), result) in job_index.into_iter().zip(&jobs).zip(results) {
        items[index] = Some(match result {
            Ok(verdict) => BatchItem {
                index,
                problem_id: answer.problem_id.clone(),
                entry: Some(HistoryEntry::from_verdict(answer, &verdict)),
                error: None,
            },
            Err(e) => BatchItem::failed(index, &answer.problem_id, format!("{e:#}")),
        });
    }
    let items: Vec<BatchItem> = items.into_iter().flatten().collect();

    print_summary(&items);

    let json = serde_json::to_string_pretty(&items)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write results: {}", path.display()))?;
            eprintln!("Results saved to: {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn print_summary(items: &[BatchItem]) {
    let entries: Vec<&HistoryEntry> = items.iter().filter_map(|i| i.entry.as_ref()).collect();
    let errors = items.len() - entries.len();

    let mut table = Table::new();
    table.set_header(vec!["Score", "Count"]);
    for score in Score::ALL {
        let count = entries.iter().filter(|e| e.ai_score == score).count();
        table.add_row(vec![Cell::new(score), Cell::new(count)]);
    }
    table.add_row(vec![
        Cell::new("rule override"),
        Cell::new(entries.iter().filter(|e| e.rule_override).count()),
    ]);
    table.add_row(vec![Cell::new("error"), Cell::new(errors)]);

    eprintln!("\n{table}");
}
