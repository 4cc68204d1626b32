//! Priority-ordered rule pre-screen.
//!
//! Rules run in ascending priority. The first high-severity violation that
//! carries a fixed score ends the pass: later rules are not run and do not
//! appear in the outcome's details. A rule that fails internally is recorded
//! as not violated and the pass continues.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::model::{count_characters, Problem, Score};
use crate::results::{
    RuleCheckResult, RuleDetail, RuleEvaluationOutcome, RuleMetrics, Severity, Violation,
};
use crate::similarity::similarity;

pub const CHARACTER_LIMIT_RULE: &str = "character_limit_check";
pub const COPY_PASTE_RULE: &str = "copy_paste_check";
pub const SENTENCE_STRUCTURE_RULE: &str = "sentence_structure_check";

/// Priority given to custom rules registered without one.
pub const DEFAULT_CUSTOM_PRIORITY: u32 = 999;

/// Similarity at or above which the answer is treated as copied.
pub const COPY_FIX_THRESHOLD: f64 = 0.6;
/// Similarity at or above which copying is flagged.
pub const COPY_WARN_THRESHOLD: f64 = 0.4;

const SENTENCE_PUNCTUATION: [char; 4] = ['、', '。', '！', '？'];
const PARTICLES: [char; 10] = ['は', 'が', 'を', 'に', 'へ', 'と', 'で', 'か', 'ら', 'ま'];
const SYMBOLS: &str = "!@#$%^&*()_+=[]{}|;:'\"<>?/\\~`";

/// Structure checks on punctuation and particles only apply above this length.
const STRUCTURE_MIN_CHARS: usize = 20;

/// Extension point for rules beyond the built-in three.
pub trait CustomRule: Send + Sync {
    fn check(&self, answer: &str, problem: &Problem) -> Result<RuleCheckResult, RuleError>;
}

impl<F> CustomRule for F
where
    F: Fn(&str, &Problem) -> Result<RuleCheckResult, RuleError> + Send + Sync,
{
    fn check(&self, answer: &str, problem: &Problem) -> Result<RuleCheckResult, RuleError> {
        self(answer, problem)
    }
}

/// The check a rule performs.
#[derive(Clone)]
pub enum RuleKind {
    CharacterLimit,
    CopyPaste,
    SentenceStructure,
    Custom(Arc<dyn CustomRule>),
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::CharacterLimit => f.write_str("CharacterLimit"),
            RuleKind::CopyPaste => f.write_str("CopyPaste"),
            RuleKind::SentenceStructure => f.write_str("SentenceStructure"),
            RuleKind::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A registered rule and its configuration.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub enabled: bool,
    pub kind: RuleKind,
}

impl Rule {
    fn builtin(id: &str, name: &str, description: &str, priority: u32, kind: RuleKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            priority,
            enabled: true,
            kind,
        }
    }

    pub fn check(&self, answer: &str, problem: &Problem) -> Result<RuleCheckResult, RuleError> {
        match &self.kind {
            RuleKind::CharacterLimit => check_character_limit(answer, problem),
            RuleKind::CopyPaste => check_copy_paste(answer, problem),
            RuleKind::SentenceStructure => check_sentence_structure(answer, problem),
            RuleKind::Custom(rule) => rule.check(answer, problem),
        }
    }
}

/// Externally supplied rule configuration, matched by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetting {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Overall status of an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// No violations.
    Passed,
    /// Violations found, none decisive.
    Flagged,
    /// A rule fixed the score.
    Overridden,
}

/// Human-facing digest of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub status: RuleStatus,
    pub fixed_score: Option<Score>,
    pub violation_count: usize,
    pub severity: Option<Severity>,
    pub message: String,
}

/// Ordered rule set. Holds configuration only; evaluation is read-only, so
/// one instance can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    rules: Vec<Rule>,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule::builtin(
                    CHARACTER_LIMIT_RULE,
                    "Character limit",
                    "Fix the score to △ when the answer exceeds 200% of the character limit",
                    1,
                    RuleKind::CharacterLimit,
                ),
                Rule::builtin(
                    COPY_PASTE_RULE,
                    "Copy-paste detection",
                    "Fix the score to ✕ when 60% or more overlaps the problem text",
                    2,
                    RuleKind::CopyPaste,
                ),
                Rule::builtin(
                    SENTENCE_STRUCTURE_RULE,
                    "Sentence structure",
                    "Fix the score to ✕ when the answer does not read as sentences",
                    3,
                    RuleKind::SentenceStructure,
                ),
            ],
        }
    }
}

impl RuleEvaluator {
    /// Evaluator with the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator with no rules registered.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run every enabled rule against `answer` in priority order.
    pub fn evaluate(&self, answer: &str, problem: &Problem) -> RuleEvaluationOutcome {
        let mut outcome = RuleEvaluationOutcome::empty();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let result = match rule.check(answer, problem) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(rule = %rule.id, error = %e, "rule check failed, skipping");
                    outcome.details.push(RuleDetail {
                        rule: rule.id.clone(),
                        name: rule.name.clone(),
                        violated: false,
                        severity: None,
                        fixed_score: None,
                        reason: None,
                        metrics: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            if result.violated {
                outcome.violations.push(Violation {
                    rule: rule.id.clone(),
                    name: rule.name.clone(),
                    reason: result.reason.clone().unwrap_or_else(|| rule.name.clone()),
                    severity: result.severity,
                });
            }

            let decisive = result.is_decisive();
            outcome.details.push(RuleDetail {
                rule: rule.id.clone(),
                name: rule.name.clone(),
                violated: result.violated,
                severity: Some(result.severity),
                fixed_score: result.fixed_score,
                reason: result.reason,
                metrics: result.metrics,
                error: None,
            });

            if decisive {
                outcome.passed = false;
                outcome.rule_override = true;
                outcome.fixed_score = result.fixed_score;
                tracing::debug!(rule = %rule.id, "decisive violation, stopping rule pass");
                break;
            }
        }

        outcome
    }

    /// Current configuration of every rule, in evaluation order.
    pub fn settings(&self) -> Vec<RuleSetting> {
        self.rules
            .iter()
            .map(|r| RuleSetting {
                id: r.id.clone(),
                enabled: r.enabled,
                priority: Some(r.priority),
            })
            .collect()
    }

    /// Apply settings by rule id, then restore priority order.
    pub fn apply_settings(&mut self, settings: &[RuleSetting]) {
        for setting in settings {
            let Some(rule) = self.rules.iter_mut().find(|r| r.id == setting.id) else {
                tracing::warn!(rule = %setting.id, "unknown rule in settings, ignoring");
                continue;
            };
            rule.enabled = setting.enabled;
            if let Some(priority) = setting.priority {
                rule.priority = priority;
            }
        }
        self.sort();
    }

    /// Enable or disable one rule. Returns `false` if no rule has that id.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Register an extension rule.
    pub fn add_custom_rule(
        &mut self,
        id: &str,
        name: &str,
        description: &str,
        priority: Option<u32>,
        check: Arc<dyn CustomRule>,
    ) -> Result<(), RuleError> {
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(RuleError::Check("custom rule needs an id and a name".into()));
        }
        if self.rules.iter().any(|r| r.id == id) {
            return Err(RuleError::Check(format!("rule '{id}' is already registered")));
        }
        self.rules.push(Rule {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            priority: priority.unwrap_or(DEFAULT_CUSTOM_PRIORITY),
            enabled: true,
            kind: RuleKind::Custom(check),
        });
        self.sort();
        Ok(())
    }

    fn sort(&mut self) {
        self.rules.sort_by_key(|r| r.priority);
    }
}

/// Digest an outcome for display.
pub fn summarize(outcome: &RuleEvaluationOutcome) -> RuleSummary {
    let severity = outcome.max_severity();
    let violation_count = outcome.violations.len();

    let (status, message) = if let Some(trigger) = outcome.triggering_violation() {
        let glyph = outcome.fixed_score.map(Score::glyph).unwrap_or("?");
        (
            RuleStatus::Overridden,
            format!("Score fixed to {glyph} by rule '{}': {}", trigger.name, trigger.reason),
        )
    } else if violation_count > 0 {
        let names: Vec<&str> = outcome.violations.iter().map(|v| v.name.as_str()).collect();
        (
            RuleStatus::Flagged,
            format!(
                "Rule warnings: {}. Proceeding to model grading.",
                names.join(", ")
            ),
        )
    } else {
        (
            RuleStatus::Passed,
            "All rule checks passed. Proceeding to model grading.".to_string(),
        )
    };

    RuleSummary {
        status,
        fixed_score: outcome.fixed_score,
        violation_count,
        severity,
        message,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Length relative to the problem's character limit.
pub fn check_character_limit(answer: &str, problem: &Problem) -> Result<RuleCheckResult, RuleError> {
    let char_limit = problem.constraints.char_limit;
    if char_limit == 0 {
        return Err(RuleError::InvalidCharLimit(char_limit));
    }
    let char_count = count_characters(answer);
    let percentage = char_count as f64 / char_limit as f64 * 100.0;
    let metrics = RuleMetrics::CharacterLimit {
        char_count,
        char_limit,
        percentage: round1(percentage),
    };
    let counts = format!("{char_count} / {char_limit} characters");

    let result = if percentage > 200.0 {
        RuleCheckResult::fix(
            Score::Acceptable,
            format!("Answer exceeds 200% of the character limit ({counts})"),
        )
    } else if percentage > 150.0 {
        RuleCheckResult::flag(
            Severity::Medium,
            format!("Answer exceeds 150% of the character limit ({counts})"),
        )
    } else if percentage < 20.0 {
        RuleCheckResult::flag(
            Severity::Low,
            format!("Answer may be far too short ({counts})"),
        )
    } else {
        RuleCheckResult::pass(None)
    };

    Ok(result.with_metrics(metrics))
}

/// Overlap between the answer and the problem's own texts.
pub fn check_copy_paste(answer: &str, problem: &Problem) -> Result<RuleCheckResult, RuleError> {
    let max_similarity = [&problem.context, &problem.prompt, &problem.model_answer]
        .into_iter()
        .filter(|source| !source.trim().is_empty())
        .map(|source| similarity(answer, source))
        .fold(0.0_f64, f64::max);

    let percent = (max_similarity * 1000.0).round() / 10.0;
    let metrics = RuleMetrics::CopyPaste {
        similarity: percent,
        threshold: COPY_FIX_THRESHOLD * 100.0,
    };

    let result = if max_similarity >= COPY_FIX_THRESHOLD {
        RuleCheckResult::fix(
            Score::Poor,
            format!("Overlap with the problem text is {percent}%, at or above the 60% threshold"),
        )
    } else if max_similarity >= COPY_WARN_THRESHOLD {
        RuleCheckResult::flag(
            Severity::Medium,
            format!("Overlap with the problem text is {percent}%, which is on the high side"),
        )
    } else {
        RuleCheckResult::pass(None)
    };

    Ok(result.with_metrics(metrics))
}

/// Heuristics for answers that do not read as sentences.
pub fn check_sentence_structure(answer: &str, _problem: &Problem) -> Result<RuleCheckResult, RuleError> {
    let char_count = count_characters(answer);
    let mut issues = Vec::new();

    if char_count > STRUCTURE_MIN_CHARS {
        let punctuation = answer
            .chars()
            .filter(|c| SENTENCE_PUNCTUATION.contains(c))
            .count();
        let particles = answer.chars().filter(|c| PARTICLES.contains(c)).count();

        if (punctuation as f64 / char_count as f64) < 0.02 {
            issues.push("almost no punctuation".to_string());
        }
        if (particles as f64 / char_count as f64) < 0.05 {
            issues.push("almost no particles".to_string());
        }
    }

    let symbols = answer.chars().filter(|c| SYMBOLS.contains(*c)).count();
    if symbols as f64 > char_count as f64 * 0.1 {
        issues.push("excessive symbols or special characters".to_string());
    }

    let repeated = find_repeated_patterns(answer);
    if !repeated.is_empty() {
        issues.push(format!("excessive repetition: {}", repeated.join(", ")));
    }

    if char_count < 5 {
        issues.push("answer is extremely short".to_string());
    }

    if char_count > 5 && latin_only_pattern().is_match(answer) {
        issues.push("only digits or Latin letters".to_string());
    }

    let result = match issues.len() {
        0 => RuleCheckResult::pass(None),
        1 => RuleCheckResult::flag(
            Severity::Medium,
            format!("Possible sentence structure problem: {}", issues[0]),
        ),
        _ => RuleCheckResult::fix(
            Score::Poor,
            format!("Answer may not form sentences: {}", issues.join(", ")),
        ),
    };

    Ok(result.with_metrics(RuleMetrics::SentenceStructure { issues }))
}

/// Runs of three or more identical characters, and words immediately
/// repeated. Each pattern is reported once, quoted. Spaces count; line
/// breaks do not.
pub fn find_repeated_patterns(text: &str) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    let mut push = |pattern: String| {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    };

    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;
    while start < chars.len() {
        let c = chars[start];
        let mut end = start + 1;
        while end < chars.len() && chars[end] == c {
            end += 1;
        }
        if end - start >= 3 && !is_line_break(c) {
            push(format!("\"{}\"", chars[start..end].iter().collect::<String>()));
        }
        start = end;
    }

    let words: Vec<&str> = word_pattern().find_iter(text).map(|m| m.as_str()).collect();
    for pair in words.windows(2) {
        if pair[0] == pair[1] && pair[0].chars().count() > 1 {
            push(format!("\"{}\"", pair[0]));
        }
    }

    patterns
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| {
        Regex::new(r"[\p{Hiragana}\p{Katakana}\p{Han}ーA-Za-z0-9]+").expect("word pattern is valid")
    })
}

fn latin_only_pattern() -> &'static Regex {
    static LATIN: OnceLock<Regex> = OnceLock::new();
    LATIN.get_or_init(|| Regex::new(r"^[0-9A-Za-z\s]*$").expect("latin pattern is valid"))
}
