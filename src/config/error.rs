//! Configuration validation errors.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Failure to build or validate a [`super::ClientConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is structurally invalid (empty string, contradictory bounds).
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A numeric field fell outside its documented bound (§4.1).
    #[error("{field} out of range: expected {min}..={max}, got {actual}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
        /// Value that was rejected.
        actual: u64,
    },
}
