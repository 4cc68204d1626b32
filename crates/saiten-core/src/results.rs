//! Result types produced by rule evaluation and grading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Score;

/// How serious a rule violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Measurements a rule took while checking an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleMetrics {
    CharacterLimit {
        char_count: usize,
        char_limit: u32,
        /// Length as a percentage of the limit, one decimal place.
        percentage: f64,
    },
    CopyPaste {
        /// Highest similarity to any problem text, as a percentage.
        similarity: f64,
        /// Percentage at which the score is fixed.
        threshold: f64,
    },
    SentenceStructure {
        issues: Vec<String>,
    },
}

/// Output of one rule for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub violated: bool,
    pub severity: Severity,
    /// Score to fix the verdict to, if this violation is decisive.
    #[serde(default)]
    pub fixed_score: Option<Score>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metrics: Option<RuleMetrics>,
}

impl RuleCheckResult {
    /// A check that found nothing wrong.
    pub fn pass(metrics: Option<RuleMetrics>) -> Self {
        Self {
            violated: false,
            severity: Severity::Medium,
            fixed_score: None,
            reason: None,
            metrics,
        }
    }

    /// A violation that does not fix the score.
    pub fn flag(severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            violated: true,
            severity,
            fixed_score: None,
            reason: Some(reason.into()),
            metrics: None,
        }
    }

    /// A violation that fixes the score.
    pub fn fix(score: Score, reason: impl Into<String>) -> Self {
        Self {
            violated: true,
            severity: Severity::High,
            fixed_score: Some(score),
            reason: Some(reason.into()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RuleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// High severity with a fixed score: ends the evaluation pass.
    pub fn is_decisive(&self) -> bool {
        self.violated && self.severity == Severity::High && self.fixed_score.is_some()
    }
}

/// Per-rule entry in an evaluation pass, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDetail {
    /// Rule identifier.
    pub rule: String,
    /// Rule display name.
    pub name: String,
    pub violated: bool,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub fixed_score: Option<Score>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metrics: Option<RuleMetrics>,
    /// Set when the rule itself failed; such rules never count as violated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A violated rule, as listed in the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub name: String,
    pub reason: String,
    pub severity: Severity,
}

/// Aggregate of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationOutcome {
    /// `false` only when a rule fixed the score.
    pub passed: bool,
    pub rule_override: bool,
    #[serde(default)]
    pub fixed_score: Option<Score>,
    pub violations: Vec<Violation>,
    pub details: Vec<RuleDetail>,
}

impl RuleEvaluationOutcome {
    pub(crate) fn empty() -> Self {
        Self {
            passed: true,
            rule_override: false,
            fixed_score: None,
            violations: Vec::new(),
            details: Vec::new(),
        }
    }

    /// The violation that fixed the score. Evaluation stops right after it,
    /// so it is always the last one recorded.
    pub fn triggering_violation(&self) -> Option<&Violation> {
        if self.rule_override {
            self.violations.last()
        } else {
            None
        }
    }

    /// Highest severity among the violations.
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

/// Strengths and weaknesses called out in a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "positive_points", default)]
    pub positive: Vec<String>,
    #[serde(rename = "negative_points", default)]
    pub negative: Vec<String>,
}

/// Which stage produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Rule,
    Model,
}

/// Token usage reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The sampling parameters actually sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Timing, usage, and audit data attached to a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictMetadata {
    pub verdict_id: Uuid,
    #[serde(default)]
    pub problem_id: Option<String>,
    #[serde(default)]
    pub rater_id: Option<String>,
    pub latency_ms: u64,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub llm_params: Option<LlmParams>,
    /// Model name reported back by the transport.
    #[serde(default)]
    pub model: Option<String>,
    /// `false` when the model output could not be parsed and a default was used.
    pub json_valid: bool,
    pub timestamp: DateTime<Utc>,
}

/// Final grading result for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingVerdict {
    #[serde(rename = "ai_score")]
    pub score: Score,
    #[serde(rename = "ai_reason")]
    pub reason: String,
    #[serde(rename = "ai_feedback")]
    pub feedback: Feedback,
    pub rule_override: bool,
    pub source: VerdictSource,
    #[serde(default)]
    pub rule_details: Vec<RuleDetail>,
    pub metadata: VerdictMetadata,
}
