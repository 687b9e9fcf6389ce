//! Error types for the session core
//!
//! Split by where they surface:
//! - CellInputError: rejected before any store or network activity
//! - SessionError: operation-level failures the CLI reports directly
//!
//! Background write failures never appear here; they roll back the store
//! and arrive as `SessionAlert`s on the session channel.

use thiserror::Error;

use crate::supabase::SupabaseError;

/// Rejected cell input.
///
/// Empty input is not an error (it means "clear the cell"); anything else
/// must parse to a finite number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellInputError {
    #[error("Not a number: \"{0}\"")]
    NotNumeric(String),

    #[error("Not a finite number: \"{0}\"")]
    NotFinite(String),
}

/// Operation-level error for session calls with a caller waiting on them.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Input(#[from] CellInputError),

    #[error(transparent)]
    Backend(#[from] SupabaseError),

    #[error("Unknown brand: {0}")]
    UnknownBrand(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl SessionError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Backend(e) if e.is_retryable())
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => {
                "Check ~/.scoreboards/config.json or set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY."
            }
            SessionError::Input(_) => {
                "Enter a plain number, or leave the cell empty to clear it."
            }
            SessionError::Backend(e) if e.is_retryable() => {
                "Check your internet connection and try again."
            }
            SessionError::Backend(_) => "The backend rejected the request. Check the logs for details.",
            SessionError::UnknownBrand(_) => "Run 'scoreboards brands' to list brands.",
            SessionError::UnknownMetric(_) => {
                "Run 'scoreboards grid' to see metric names and ids."
            }
            SessionError::InvalidRequest(_) => "Check the arguments and try again.",
        }
    }
}
