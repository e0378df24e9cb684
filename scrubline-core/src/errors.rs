//! errors.rs - Load-time error types for the scrubline-core library.
//!
//! Rule-set problems are fatal for the whole set and are reported through
//! [`ScrublineError`]. Record-time problems are not errors in this sense; they
//! are collected as [`crate::summary::ProcessingError`] values.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScrublineError {
    #[error("Rule #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Rule '{0}' has an empty pattern")]
    EmptyPattern(String),

    #[error("Rule '{id}' has unknown type '{value}' (allowed: regex, marker, literal)")]
    UnknownKind { id: String, value: String },

    #[error("Rule '{id}' has unknown scope '{value}' (allowed: prompt, field, global)")]
    UnknownScope { id: String, value: String },

    #[error("Duplicate rule id '{0}'")]
    DuplicateRuleId(String),

    #[error("Failed to compile redaction rule '{0}': {1}")]
    RuleCompilationError(String, regex::Error),

    #[error("Rule '{0}' matches the empty string; every match must consume text")]
    EmptyMatch(String),

    #[error("Marker rule '{0}' must contain a named capture group 'content'")]
    MarkerWithoutContentGroup(String),

    #[error("Failed to parse rule source '{source_name}': {message}")]
    Parse { source_name: String, message: String },

    #[error("Failed to serialize rule for fingerprinting: {0}")]
    SerializationError(String),

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}
