//! Typed error hierarchy for the wizard orchestration core.
//!
//! The taxonomy follows the recovery policy, not the subsystem:
//! - `StreamParse` — recoverable, the offending line is skipped
//! - `Connection` — handled autonomously by backoff, terminal once exhausted
//! - `Validation` — structurally invalid input (category index, snapshot
//!   shape); corrected by the caller, never retried as-is
//! - `Timeout` — fatal for the current operation, user must retry
//! - `Backend` — message-classified as retryable or not

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("malformed stream frame: {0}")]
    StreamParse(String),

    #[error("connection lost after {attempts} reconnect attempts")]
    Connection { attempts: u32 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend error: {message}")]
    Backend { message: String, retryable: bool },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WizardError {
    /// Whether retrying the same operation could reasonably succeed.
    ///
    /// Parse and validation errors are recovered from in place and never
    /// reach a retry decision; they report `false` here.
    pub fn is_retryable(&self) -> bool {
        match self {
            WizardError::Backend { retryable, .. } => *retryable,
            WizardError::Connection { .. } => false,
            WizardError::Timeout(_) => false,
            WizardError::StreamParse(_) => false,
            WizardError::Validation(_) => false,
            WizardError::Other(_) => false,
        }
    }
}

/// Build a `Backend` error, classifying retryability from the message.
pub fn backend_error(message: impl Into<String>) -> WizardError {
    let message = message.into();
    let retryable = is_retryable_message(&message);
    WizardError::Backend { message, retryable }
}

/// Classify a backend failure message as retryable or not.
///
/// Request-shape problems are permanent; transient server and network
/// conditions are worth retrying. Unrecognized messages are treated as
/// permanent so a broken request is never retried in a loop.
pub fn is_retryable_message(message: &str) -> bool {
    let m = message.to_ascii_lowercase();

    const PERMANENT: &[&str] = &[
        "invalid",
        "bad request",
        "malformed",
        "unsupported",
        "schema",
        "unauthorized",
        "forbidden",
        "not found",
    ];
    if PERMANENT.iter().any(|p| m.contains(p)) {
        return false;
    }

    const TRANSIENT: &[&str] = &[
        "timeout",
        "timed out",
        "unavailable",
        "connection reset",
        "connection refused",
        "temporar",
        "overloaded",
        "rate limit",
        "too many requests",
        "502",
        "503",
        "504",
    ];
    TRANSIENT.iter().any(|p| m.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_classifies_request_shape_as_permanent() {
        let err = backend_error("Invalid request: missing topic field");
        match err {
            WizardError::Backend { retryable, .. } => assert!(!retryable),
            _ => panic!("Expected Backend variant"),
        }
    }

    #[test]
    fn backend_error_classifies_transient_as_retryable() {
        for msg in [
            "upstream timeout",
            "service unavailable (503)",
            "connection reset by peer",
            "rate limit exceeded, retry later",
        ] {
            let err = backend_error(msg);
            assert!(err.is_retryable(), "expected retryable for {msg:?}");
        }
    }

    #[test]
    fn permanent_markers_win_over_transient_markers() {
        // "invalid" dominates even when a transient word also appears.
        assert!(!is_retryable_message("invalid request after timeout"));
    }

    #[test]
    fn unknown_messages_are_not_retryable() {
        assert!(!is_retryable_message("something odd happened"));
    }

    #[test]
    fn connection_and_timeout_are_terminal() {
        assert!(!WizardError::Connection { attempts: 5 }.is_retryable());
        assert!(!WizardError::Timeout(Duration::from_secs(300)).is_retryable());
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WizardError::StreamParse("x".into()));
        assert_std_error(&WizardError::Validation("y".into()));
    }
}
