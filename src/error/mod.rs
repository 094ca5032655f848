//! Error types for `inshallah`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Provides recovery hints for user-facing errors
//! - The runner converts backend failures into a structured `DagResult`
//!   instead of propagating them; only spawn/IO problems surface here

use thiserror::Error;

/// Primary error type for `inshallah` operations.
#[derive(Error, Debug)]
pub enum InshallahError {
    // === Issue errors ===
    /// Issue with the specified ID was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// Partial ID matches multiple issues.
    #[error("Ambiguous prefix '{partial}': matches {matches:?}")]
    AmbiguousPrefix {
        partial: String,
        matches: Vec<String>,
    },

    // === Validation errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Priority out of valid range (1-5).
    #[error("Priority must be 1-5, got: {priority}")]
    InvalidPriority { priority: i64 },

    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid outcome value.
    #[error("Invalid outcome: {outcome}")]
    InvalidOutcome { outcome: String },

    /// Invalid dependency edge type.
    #[error("Invalid dependency type: {dep_type}")]
    InvalidDepType { dep_type: String },

    // === Backend errors ===
    /// A backend was registered twice under the same name.
    #[error("Backend already registered: {name}")]
    DuplicateBackend { name: String },

    /// A backend was registered with an empty name.
    #[error("Backend name cannot be empty")]
    EmptyBackendName,

    /// The backend subprocess could not be launched.
    #[error("Failed to spawn backend '{name}': {source}")]
    BackendSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // === I/O errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InshallahError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IssueNotFound { .. }
                | Self::AmbiguousPrefix { .. }
                | Self::Validation { .. }
                | Self::InvalidPriority { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidOutcome { .. }
                | Self::InvalidDepType { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::IssueNotFound { .. } => Some("Run: inshallah issues list"),
            Self::AmbiguousPrefix { .. } => Some("Provide more characters of the ID"),
            Self::InvalidPriority { .. } => {
                Some("Use a priority between 1 (highest) and 5 (lowest)")
            }
            Self::InvalidStatus { .. } => Some("Valid statuses: open, in_progress, closed"),
            Self::InvalidOutcome { .. } => {
                Some("Valid outcomes: success, failure, needs_work, skipped, expanded")
            }
            Self::InvalidDepType { .. } => Some("Valid dependency types: parent, blocks"),
            Self::BackendSpawn { .. } => Some("Check that the backend CLI is on PATH"),
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `InshallahError`.
pub type Result<T> = std::result::Result<T, InshallahError>;
