//! Error types for input validation and the criterion scoring pipeline.

use thiserror::Error;

/// Input rejected before any computation or external call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Classification requires at least one criterion.
    #[error("criterion set must contain at least one criterion")]
    EmptyCriterionSet,

    #[error("criterion '{name}' appears more than once")]
    DuplicateCriterion { name: String },

    /// Criterion names must be non-blank.
    #[error("criterion name must not be empty")]
    BlankCriterion,

    /// A weight was supplied for a criterion outside the active set.
    #[error("weight given for unknown criterion '{name}'")]
    UnknownWeight { name: String },

    #[error("weight for '{name}' must be a non-negative finite number, got {value}")]
    InvalidWeight { name: String, value: f64 },

    #[error("invalid ABC thresholds a={a}, b={b}: require 0 < a <= b <= 1")]
    InvalidThresholds { a: f64, b: f64 },

    /// A required text field was missing or blank.
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid field key '{key}': {reason}")]
    InvalidFieldKey { key: String, reason: &'static str },
}

/// Operation-level failure of a criterion scoring run.
///
/// Per-item failures never surface here; they are collected in
/// [`ScoringReport::failed`](crate::pipeline::ScoringReport::failed).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid criterion definition: {0}")]
    Validation(#[from] ValidationError),

    /// Target items could not be listed.
    #[error("failed to enumerate items: {reason}")]
    Enumerate { reason: String },

    /// The criterion definition could not be embedded; no item work is possible.
    #[error("failed to embed criterion definition: {reason}")]
    Embedding { reason: String },

    /// The bulk write of surviving updates failed as a whole.
    #[error("bulk commit of {pending} updates failed: {reason}")]
    Commit { pending: usize, reason: String },
}
