//! Turns raw model output into verdict fields.
//!
//! [`normalize`] never fails. Parsing strategies are tried in order until
//! one yields a JSON object; that object is then validated field by field,
//! coercing anything unusable. If no strategy yields an object the safe
//! default is returned with `json_valid = false`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::Score;
use crate::results::Feedback;

/// Reason used when the model output could not be parsed at all.
pub const FALLBACK_REASON: &str =
    "Could not verify the AI response. A human grader needs to review this answer.";

/// Reason used when the parsed object has no usable `ai_reason`.
pub const MISSING_REASON: &str = "The AI response did not include a usable reason.";

/// Why a single parsing strategy failed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no fenced code block found")]
    NoFencedBlock,

    #[error("no brace-delimited object found")]
    NoBraces,
}

type Strategy = fn(&str) -> Result<Value, ParseError>;

/// Ordered parsing strategies.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("braces", parse_braces),
];

/// Verdict fields recovered from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub score: Score,
    pub reason: String,
    pub feedback: Feedback,
    /// `true` when some strategy produced a JSON object.
    pub json_valid: bool,
    /// Name of the strategy that succeeded.
    pub strategy: Option<&'static str>,
}

impl NormalizedResponse {
    /// The safe default for unparseable output.
    pub fn fallback() -> Self {
        Self {
            score: Score::Acceptable,
            reason: FALLBACK_REASON.to_string(),
            feedback: Feedback::default(),
            json_valid: false,
            strategy: None,
        }
    }
}

/// Normalize raw model output.
pub fn normalize(raw: &str) -> NormalizedResponse {
    for &(name, strategy) in STRATEGIES {
        match strategy(raw) {
            Ok(Value::Object(map)) => {
                if name != "direct" {
                    tracing::warn!(strategy = name, "model output needed repair before parsing");
                }
                let mut response = validate(&map);
                response.strategy = Some(name);
                return response;
            }
            Ok(other) => {
                tracing::debug!(strategy = name, kind = json_kind(&other), "parsed value is not an object");
            }
            Err(e) => {
                tracing::debug!(strategy = name, error = %e, "parse strategy failed");
            }
        }
    }

    tracing::warn!(
        raw_len = raw.len(),
        "could not parse model output, using safe default"
    );
    NormalizedResponse::fallback()
}

fn parse_direct(raw: &str) -> Result<Value, ParseError> {
    Ok(serde_json::from_str(raw.trim())?)
}

fn parse_fenced(raw: &str) -> Result<Value, ParseError> {
    let captures = labeled_fence()
        .captures(raw)
        .or_else(|| any_fence().captures(raw))
        .ok_or(ParseError::NoFencedBlock)?;
    let body = captures.get(1).map_or("", |m| m.as_str());
    Ok(serde_json::from_str(body)?)
}

fn parse_braces(raw: &str) -> Result<Value, ParseError> {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(serde_json::from_str(&raw[start..=end])?),
        _ => Err(ParseError::NoBraces),
    }
}

fn labeled_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?si)```json\s*(.*?)\s*```").expect("fence pattern is valid"))
}

fn any_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

fn validate(map: &Map<String, Value>) -> NormalizedResponse {
    let raw_score = map.get("ai_score");
    let score = raw_score
        .and_then(Value::as_str)
        .and_then(|s| Score::from_glyph(s.trim()))
        .unwrap_or_else(|| {
            tracing::warn!(value = ?raw_score, "invalid ai_score, coercing to △");
            Score::Acceptable
        });

    let reason = match map.get("ai_reason") {
        Some(Value::String(s)) => s.clone(),
        other => {
            tracing::warn!(value = ?other, "invalid ai_reason, using placeholder");
            MISSING_REASON.to_string()
        }
    };

    let feedback = map.get("ai_feedback");
    let feedback = Feedback {
        positive: string_list(feedback.and_then(|f| f.get("positive_points")), "positive_points"),
        negative: string_list(feedback.and_then(|f| f.get("negative_points")), "negative_points"),
    };

    NormalizedResponse {
        score,
        reason,
        feedback,
        json_valid: true,
        strategy: None,
    }
}

fn string_list(value: Option<&Value>, field: &str) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => {
            let strings: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
            if strings.len() != items.len() {
                tracing::warn!(field, dropped = items.len() - strings.len(), "dropped non-string feedback items");
            }
            strings
        }
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            tracing::warn!(field, kind = json_kind(other), "feedback is not a list, using empty list");
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
