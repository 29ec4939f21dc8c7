//! Error types for the handoff orchestrator.
//!
//! Provides [`HandoffError`] as the top-level error type. Variants are
//! grouped into recoverable (collaborator, contention, deadline) and fatal
//! (validation, invariant, config) categories to guide callers on whether
//! a degraded-output fallback applies or the request must fail.

use thiserror::Error;

/// Top-level error type for the handoff orchestrator.
///
/// Stage-local failures are normally absorbed by the degraded-output rules
/// of the pipeline; only errors that prevent producing any response at all
/// surface to the caller.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandoffError {
    // ── Recoverable ──────────────────────────────────────────────────

    /// An external collaborator failed transiently; a retry may succeed.
    #[error("collaborator transient failure: {message} (attempt {attempts})")]
    CollaboratorTransient {
        /// Collaborator-supplied failure message.
        message: String,
        /// How many attempts have been made so far.
        attempts: u32,
    },

    /// An external collaborator failed terminally after retry exhaustion.
    #[error("collaborator terminal failure in {stage}: {message}")]
    CollaboratorTerminal {
        /// Pipeline stage that made the call.
        stage: String,
        /// Collaborator-supplied failure message.
        message: String,
    },

    /// A stage exceeded its deadline.
    #[error("deadline exceeded in {stage}")]
    DeadlineExceeded {
        /// Pipeline stage that timed out.
        stage: String,
    },

    /// An assignment commit lost the race repeatedly and gave up.
    #[error("assignment contention exhausted after {attempts} attempts")]
    ContentionExhausted {
        /// Number of claim/commit attempts made.
        attempts: u32,
    },

    /// The wait queue rejected a low-priority entry under backpressure.
    #[error("queue full: {length} entries")]
    QueueFull {
        /// Queue length observed at rejection time.
        length: usize,
    },

    // ── Fatal ────────────────────────────────────────────────────────

    /// A submit call was malformed; no Request was created.
    #[error("validation error: {reason}")]
    Validation {
        /// What was wrong with the submission.
        reason: String,
    },

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A programmer-error invariant was violated; the request is failed.
    #[error("invariant violation: {reason}")]
    InvariantViolation {
        /// The invariant that did not hold.
        reason: String,
    },

    /// The customer cancelled the request. Idempotent.
    #[error("request abandoned")]
    Abandoned,

    /// The referenced request, agent, or entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HandoffError {
    /// Whether a retry of the failed operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HandoffError::CollaboratorTransient { .. }
                | HandoffError::DeadlineExceeded { .. }
                | HandoffError::ContentionExhausted { .. }
                | HandoffError::QueueFull { .. }
        )
    }
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HandoffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_display() {
        let err = HandoffError::DeadlineExceeded {
            stage: "chatbot".into(),
        };
        assert_eq!(err.to_string(), "deadline exceeded in chatbot");
    }

    #[test]
    fn queue_full_display() {
        let err = HandoffError::QueueFull { length: 400 };
        assert_eq!(err.to_string(), "queue full: 400 entries");
    }

    #[test]
    fn recoverable_classification() {
        assert!(
            HandoffError::CollaboratorTransient {
                message: "503".into(),
                attempts: 1,
            }
            .is_recoverable()
        );
        assert!(HandoffError::ContentionExhausted { attempts: 3 }.is_recoverable());
        assert!(
            !HandoffError::Validation {
                reason: "empty query".into(),
            }
            .is_recoverable()
        );
        assert!(
            !HandoffError::InvariantViolation {
                reason: "double writer".into(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HandoffError = io_err.into();
        assert!(matches!(err, HandoffError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad}}").unwrap_err();
        let err: HandoffError = json_err.into();
        assert!(matches!(err, HandoffError::Json(_)));
    }

    #[test]
    fn result_alias_works() {
        fn ok_fn() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(ok_fn().unwrap(), 7);
    }
}
