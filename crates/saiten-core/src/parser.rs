//! TOML problem set parser.
//!
//! Loads problem sets from TOML files and directories, and validates them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Problem, ProblemSet};

/// Intermediate TOML structure for problem set files.
#[derive(Debug, Deserialize)]
struct TomlProblemFile {
    problem_set: TomlProblemSetHeader,
    #[serde(default)]
    problems: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
struct TomlProblemSetHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    exam: Option<String>,
}

/// Parse a single TOML file into a `ProblemSet`.
pub fn parse_problem_set(path: &Path) -> Result<ProblemSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read problem set file: {}", path.display()))?;

    parse_problem_set_str(&content, path)
}

/// Parse a TOML string into a `ProblemSet`.
pub fn parse_problem_set_str(content: &str, source_path: &Path) -> Result<ProblemSet> {
    let parsed: TomlProblemFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    Ok(ProblemSet {
        id: parsed.problem_set.id,
        name: parsed.problem_set.name,
        description: parsed.problem_set.description,
        exam: parsed.problem_set.exam,
        problems: parsed.problems,
    })
}

/// Recursively load all `.toml` problem set files from a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_problem_directory(dir: &Path) -> Result<Vec<ProblemSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            sets.extend(load_problem_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_problem_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load problem sets from a file or a directory.
pub fn load_problems(path: &Path) -> Result<Vec<ProblemSet>> {
    if path.is_dir() {
        load_problem_directory(path)
    } else {
        Ok(vec![parse_problem_set(path)?])
    }
}

/// Find a problem by id across several sets, along with its set.
pub fn find_problem<'a>(sets: &'a [ProblemSet], id: &str) -> Option<(&'a ProblemSet, &'a Problem)> {
    sets.iter()
        .find_map(|set| set.find(id).map(|problem| (set, problem)))
}

/// A warning from problem set validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    /// The problem ID (if applicable).
    pub problem_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a problem set for common issues.
pub fn validate_problem_set(set: &ProblemSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if set.problems.is_empty() {
        warnings.push(ValidationWarning {
            problem_id: None,
            message: "problem set contains no problems".into(),
        });
    }

    let mut seen_ids = std::collections::HashSet::new();
    for problem in &set.problems {
        if !seen_ids.insert(&problem.id) {
            warnings.push(ValidationWarning {
                problem_id: Some(problem.id.clone()),
                message: format!("duplicate problem ID: {}", problem.id),
            });
        }
    }

    for problem in &set.problems {
        if let Err(e) = problem.validate() {
            warnings.push(ValidationWarning {
                problem_id: Some(problem.id.clone()),
                message: e.to_string(),
            });
        }
    }

    warnings
}
