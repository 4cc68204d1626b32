//! The record handed to the history store after grading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GradingError;
use crate::model::{CandidateAnswer, Score};
use crate::results::{Feedback, GradingVerdict, LlmParams, TokenUsage};

/// One graded answer, plus the human's final verdict once given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub problem_id: String,
    pub student_answer: String,
    pub ai_score: Score,
    pub ai_reason: String,
    pub ai_feedback: Feedback,
    #[serde(default)]
    pub final_score: Option<Score>,
    #[serde(default)]
    pub final_comment: String,
    pub rule_override: bool,
    pub json_valid: bool,
    #[serde(default)]
    pub llm_params: Option<LlmParams>,
    pub latency_ms: u64,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub rater_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Build a pending entry from a verdict. The entry id is the verdict id.
    pub fn from_verdict(answer: &CandidateAnswer, verdict: &GradingVerdict) -> Self {
        Self {
            id: verdict.metadata.verdict_id,
            problem_id: answer.problem_id.clone(),
            student_answer: answer.text.clone(),
            ai_score: verdict.score,
            ai_reason: verdict.reason.clone(),
            ai_feedback: verdict.feedback.clone(),
            final_score: None,
            final_comment: String::new(),
            rule_override: verdict.rule_override,
            json_valid: verdict.metadata.json_valid,
            llm_params: verdict.metadata.llm_params.clone(),
            latency_ms: verdict.metadata.latency_ms,
            token_usage: verdict.metadata.token_usage,
            rater_id: answer
                .rater_id
                .clone()
                .or_else(|| verdict.metadata.rater_id.clone()),
            timestamp: verdict.metadata.timestamp,
        }
    }

    /// Record the human's final verdict.
    ///
    /// Overruling the AI score requires a comment explaining why.
    pub fn finalize(&mut self, final_score: Score, comment: &str) -> Result<(), GradingError> {
        let comment = comment.trim();
        if final_score != self.ai_score && comment.is_empty() {
            return Err(GradingError::InvalidField {
                field: "final_comment",
                message: format!(
                    "a comment is required when the final score ({final_score}) differs from the AI score ({})",
                    self.ai_score
                ),
            });
        }
        self.final_score = Some(final_score);
        self.final_comment = comment.to_string();
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.final_score.is_none()
    }

    /// `Some(true)` when the human agreed with the AI score.
    pub fn agrees_with_ai(&self) -> Option<bool> {
        self.final_score.map(|s| s == self.ai_score)
    }
}
