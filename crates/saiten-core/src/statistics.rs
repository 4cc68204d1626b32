//! Aggregate statistics over reviewed grading history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::history::HistoryEntry;
use crate::model::Score;

/// Window used for `recent_activity`.
pub const RECENT_DAYS: i64 = 7;

/// Count of final scores per level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub acceptable: usize,
    pub poor: usize,
}

impl ScoreDistribution {
    fn record(&mut self, score: Score) {
        match score {
            Score::Excellent => self.excellent += 1,
            Score::Acceptable => self.acceptable += 1,
            Score::Poor => self.poor += 1,
        }
    }

    pub fn get(&self, score: Score) -> usize {
        match score {
            Score::Excellent => self.excellent,
            Score::Acceptable => self.acceptable,
            Score::Poor => self.poor,
        }
    }
}

/// How often the human's final score matched the AI score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub matches: usize,
    /// Entries with a final score.
    pub total: usize,
    /// `matches / total` as a whole percentage, 0 when nothing is reviewed.
    pub percentage: u32,
}

/// Review statistics for a set of history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total: usize,
    /// Entries still waiting for a human verdict.
    pub pending: usize,
    pub score_distribution: ScoreDistribution,
    pub ai_agreement: Agreement,
    pub rule_overrides: usize,
    /// Entries whose model output had to fall back to the safe default.
    pub json_failures: usize,
    /// Mean latency, rounded to whole milliseconds.
    pub average_latency_ms: u64,
    /// Entries in the last [`RECENT_DAYS`] days.
    pub recent_activity: usize,
    /// Mean of final scores on the 0 / 0.5 / 1 scale.
    pub mean_final_score: Option<f64>,
}

/// Compute review statistics as of `now`.
pub fn compute_review_stats(entries: &[HistoryEntry], now: DateTime<Utc>) -> ReviewStats {
    let mut distribution = ScoreDistribution::default();
    let mut agreement = Agreement::default();
    let mut final_sum = 0.0;
    let recent_cutoff = now - Duration::days(RECENT_DAYS);

    for entry in entries {
        if let Some(final_score) = entry.final_score {
            distribution.record(final_score);
            agreement.total += 1;
            if final_score == entry.ai_score {
                agreement.matches += 1;
            }
            final_sum += final_score.value();
        }
    }

    if agreement.total > 0 {
        agreement.percentage =
            (agreement.matches as f64 / agreement.total as f64 * 100.0).round() as u32;
    }

    let average_latency_ms = if entries.is_empty() {
        0
    } else {
        let sum: u64 = entries.iter().map(|e| e.latency_ms).sum();
        (sum as f64 / entries.len() as f64).round() as u64
    };

    ReviewStats {
        total: entries.len(),
        pending: entries.iter().filter(|e| e.is_pending()).count(),
        score_distribution: distribution,
        ai_agreement: agreement,
        rule_overrides: entries.iter().filter(|e| e.rule_override).count(),
        json_failures: entries.iter().filter(|e| !e.json_valid).count(),
        average_latency_ms,
        recent_activity: entries
            .iter()
            .filter(|e| e.timestamp >= recent_cutoff)
            .count(),
        mean_final_score: (agreement.total > 0).then(|| final_sum / agreement.total as f64),
    }
}
