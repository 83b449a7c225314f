//! # Error Hierarchy
//!
//! Structured error types for TAMSys, built with `thiserror`.
//!
//! The taxonomy is small: every failure a caller can act on is
//! either a missing (or foreign-tenant) entity, a uniqueness violation, or a
//! rejected input. Persistence failures belong to the service layer.

use thiserror::Error;

/// Top-level error type for TAMSys operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TamsysError {
    /// Referenced entity is absent or not owned by the calling tenant.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. "device".
        kind: &'static str,
        /// Identifier as supplied by the caller.
        id: String,
    },

    /// Uniqueness violation (duplicate catalog name/code, rule triple, or
    /// compliance record key).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input rejected by a business rule.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl TamsysError {
    /// Shorthand for [`TamsysError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error is a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Field-level validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field was empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// A text field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters (got {actual})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum permitted length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Country ISO code is not three ASCII letters, or is the reserved
    /// "ALL" sentinel.
    #[error("invalid ISO country code: {0:?} (expected three letters)")]
    InvalidIsoCode(String),

    /// Notification threshold outside 1..=365 days.
    #[error("days_before_expiry must be between 1 and 365 (got {0})")]
    ThresholdOutOfRange(i64),

    /// Status ACTIVE was requested without an expiry date.
    #[error("status ACTIVE requires an expiry_date")]
    ActiveRequiresExpiry,

    /// Status value that callers may not set directly.
    #[error("status {0} is assigned by the expiry job and cannot be set directly")]
    SchedulerOwnedStatus(String),

    /// Unrecognized enumeration value.
    #[error("unknown {kind} value: {value:?}")]
    UnknownValue {
        /// Enumeration name, e.g. "status".
        kind: &'static str,
        /// Rejected input.
        value: String,
    },
}
