//! The `saiten stats` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use saiten_core::history::HistoryEntry;
use saiten_core::model::Score;
use saiten_core::statistics::{compute_review_stats, ReviewStats, RECENT_DAYS};

use super::OutputFormat;

pub fn execute(history_path: PathBuf, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(&history_path)
        .with_context(|| format!("failed to read history: {}", history_path.display()))?;
    let entries: Vec<HistoryEntry> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse history: {}", history_path.display()))?;

    let stats = compute_review_stats(&entries, chrono::Utc::now());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => println!("{}", stats_table(&stats)),
    }

    Ok(())
}

fn stats_table(stats: &ReviewStats) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);

    let agreement = &stats.ai_agreement;
    let mut rows: Vec<(String, String)> = vec![
        ("Total".into(), stats.total.to_string()),
        ("Pending review".into(), stats.pending.to_string()),
    ];
    for score in Score::ALL {
        rows.push((
            format!("Final {score}"),
            stats.score_distribution.get(score).to_string(),
        ));
    }
    rows.extend([
        (
            "AI agreement".into(),
            format!(
                "{}% ({}/{})",
                agreement.percentage, agreement.matches, agreement.total
            ),
        ),
        ("Rule overrides".into(), stats.rule_overrides.to_string()),
        ("JSON failures".into(), stats.json_failures.to_string()),
        (
            "Average latency".into(),
            format!("{}ms", stats.average_latency_ms),
        ),
        (
            format!("Last {RECENT_DAYS} days"),
            stats.recent_activity.to_string(),
        ),
        (
            "Mean final score".into(),
            stats
                .mean_final_score
                .map(|m| format!("{m:.2}"))
                .unwrap_or_else(|| "-".into()),
        ),
    ]);

    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }
    table
}
