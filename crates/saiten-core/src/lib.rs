//! saiten-core — Rule engine, response normalizer, and grading orchestrator.
//!
//! This crate holds the grading decision pipeline: a deterministic rule
//! pre-screen that can fix a score without calling a model, the prompt sent
//! to the model otherwise, and the tolerant parser that turns whatever text
//! comes back into a well-formed verdict.

pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod results;
pub mod rules;
pub mod similarity;
pub mod statistics;
pub mod traits;
