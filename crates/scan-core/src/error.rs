//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Field value outside its physical range
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Lower bound above upper bound, or a non-finite limit
    #[error("Invalid bounds for {field}: [{lower}, {upper}]")]
    InvalidBounds { field: String, lower: f64, upper: f64 },
}

impl DomainError {
    /// Shorthand for an out-of-range field.
    pub fn out_of_range(field: &str, value: f64, expected: &str) -> Self {
        Self::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
