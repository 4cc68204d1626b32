//! Core data model types for saiten.
//!
//! Problems are read-only inputs to the pipeline; a candidate answer is
//! always graded against exactly one problem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GradingError;

/// Character limit applied when a problem does not specify one.
pub const DEFAULT_CHAR_LIMIT: u32 = 40;

const MAX_CONTEXT_CHARS: usize = 10_000;
const MAX_PROMPT_CHARS: usize = 1_000;
const MAX_MODEL_ANSWER_CHARS: usize = 2_000;
const MAX_INTENT_CHARS: usize = 1_000;

/// One exam question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier for this problem.
    pub id: String,
    /// Exam year (e.g. "2023").
    #[serde(default)]
    pub year: String,
    /// Question group within the exam (e.g. "午後I 問1").
    #[serde(default)]
    pub question_group: String,
    /// Question number within the group (e.g. "設問1(1)").
    #[serde(default)]
    pub question_number: String,
    /// Case description the question refers to.
    pub context: String,
    /// The question itself.
    pub prompt: String,
    /// Reference answer.
    pub model_answer: String,
    /// What the examiners intend the question to measure.
    pub intent: String,
    /// Answer constraints.
    #[serde(default)]
    pub constraints: Constraints,
}

/// Constraints a candidate answer is expected to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Target answer length in non-whitespace characters.
    #[serde(default = "default_char_limit")]
    pub char_limit: u32,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            char_limit: DEFAULT_CHAR_LIMIT,
        }
    }
}

fn default_char_limit() -> u32 {
    DEFAULT_CHAR_LIMIT
}

impl Problem {
    /// Check that every field the pipeline depends on is usable.
    pub fn validate(&self) -> Result<(), GradingError> {
        let required = [
            ("id", &self.id),
            ("context", &self.context),
            ("prompt", &self.prompt),
            ("model_answer", &self.model_answer),
            ("intent", &self.intent),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(GradingError::MissingField(field));
            }
        }

        if self.constraints.char_limit == 0 {
            return Err(GradingError::InvalidField {
                field: "char_limit",
                message: "must be at least 1".into(),
            });
        }

        let limits = [
            ("context", &self.context, MAX_CONTEXT_CHARS),
            ("prompt", &self.prompt, MAX_PROMPT_CHARS),
            ("model_answer", &self.model_answer, MAX_MODEL_ANSWER_CHARS),
            ("intent", &self.intent, MAX_INTENT_CHARS),
        ];
        for (field, value, max) in limits {
            let len = value.chars().count();
            if len > max {
                return Err(GradingError::InvalidField {
                    field,
                    message: format!("{len} characters exceeds the maximum of {max}"),
                });
            }
        }

        Ok(())
    }

    /// Short human-readable label, e.g. "2023 午後I 問1 設問1(1)".
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [
            self.year.as_str(),
            self.question_group.as_str(),
            self.question_number.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        if parts.is_empty() {
            self.id.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// An answer submitted for grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAnswer {
    /// The problem this answer was written for.
    pub problem_id: String,
    /// The answer text.
    #[serde(alias = "answer")]
    pub text: String,
    /// Who requested the grading.
    #[serde(default)]
    pub rater_id: Option<String>,
}

impl CandidateAnswer {
    pub fn new(problem_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.into(),
            text: text.into(),
            rater_id: None,
        }
    }

    pub fn with_rater(mut self, rater_id: impl Into<String>) -> Self {
        self.rater_id = Some(rater_id.into());
        self
    }

    /// Check the answer belongs to `problem` and is not blank.
    pub fn validate_for(&self, problem: &Problem) -> Result<(), GradingError> {
        if self.text.trim().is_empty() {
            return Err(GradingError::MissingField("student_answer"));
        }
        if self.problem_id != problem.id {
            return Err(GradingError::InvalidField {
                field: "problem_id",
                message: format!(
                    "answer is for '{}' but problem is '{}'",
                    self.problem_id, problem.id
                ),
            });
        }
        Ok(())
    }
}

/// Three-level grade.
///
/// Variants are declared lowest first so the derived ordering is
/// Poor < Acceptable < Excellent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Score {
    #[serde(rename = "✕")]
    Poor,
    #[serde(rename = "△")]
    Acceptable,
    #[serde(rename = "〇")]
    Excellent,
}

impl Score {
    pub const ALL: [Score; 3] = [Score::Excellent, Score::Acceptable, Score::Poor];

    /// The glyph graders use for this score.
    pub fn glyph(self) -> &'static str {
        match self {
            Score::Excellent => "〇",
            Score::Acceptable => "△",
            Score::Poor => "✕",
        }
    }

    /// Strict glyph lookup, used on model output.
    pub fn from_glyph(s: &str) -> Option<Score> {
        Score::ALL.into_iter().find(|score| score.glyph() == s)
    }

    /// Numeric value for aggregation.
    pub fn value(self) -> f64 {
        match self {
            Score::Excellent => 1.0,
            Score::Acceptable => 0.5,
            Score::Poor => 0.0,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

impl FromStr for Score {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(score) = Score::from_glyph(trimmed) {
            return Ok(score);
        }
        match trimmed.to_lowercase().as_str() {
            "excellent" => Ok(Score::Excellent),
            "acceptable" => Ok(Score::Acceptable),
            "poor" => Ok(Score::Poor),
            other => Err(format!("unknown score: {other}")),
        }
    }
}

/// A collection of problems loaded together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSet {
    /// Unique identifier for this problem set.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of this problem set.
    #[serde(default)]
    pub description: String,
    /// Exam name used in the grading instruction, if different from the default.
    #[serde(default)]
    pub exam: Option<String>,
    /// The problems in this set.
    #[serde(default)]
    pub problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn find(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }
}

/// Count characters the way graders do: every Unicode whitespace is ignored.
pub fn count_characters(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
