//! Error taxonomy of the sequencing engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by sequencing operations.
///
/// Only [`SequencingError::MalformedTree`] is fatal (it aborts course load).
/// Everything else is local to a single request and leaves the session
/// untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SequencingError {
    #[error("Malformed activity tree: {0}")]
    MalformedTree(String),

    #[error("Navigation not available: {0}")]
    NavigationNotAvailable(String),

    #[error("Unknown activity: {0}")]
    UnknownActivity(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
}

impl SequencingError {
    pub(crate) fn not_available(reason: impl Into<String>) -> Self {
        Self::NavigationNotAvailable(reason.into())
    }

    /// Whether the error is a recoverable navigation failure rather than a
    /// load or lookup failure.
    pub fn is_navigation_failure(&self) -> bool {
        matches!(
            self,
            Self::NavigationNotAvailable(_) | Self::UnknownActivity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SequencingError>;
