//! Unified error type for the coordination core.
//!
//! Per the error-handling design, every failure surface in this crate is a typed
//! variant of [`Error`] — there is no control-flow-by-panic. Validator and
//! rate-limit failures never mutate state; timeout and manual-required outcomes
//! carry partial results alongside the error at the call site rather than through
//! this enum.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The single tagged error type surfaced by every public operation.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Schema, type, enumeration, or range validation failed.
    #[error("validation failed on field `{field}`: {code}")]
    ValidationFailed {
        /// The field that failed validation.
        field: String,
        /// A short machine-readable reason code.
        code: String,
    },

    /// The client has exceeded its token-bucket rate limit.
    #[error("rate limited, retry after {retry_after_ms}ms (severity: {severity})")]
    RateLimited {
        /// Suggested backoff before retrying.
        retry_after_ms: u64,
        /// How far over the limit the client is.
        severity: RateLimitSeverity,
    },

    /// The client's abuse score crossed the configured threshold.
    #[error("client blocked until {until}")]
    ClientBlocked {
        /// RFC3339 timestamp the block lifts.
        until: chrono::DateTime<chrono::Utc>,
    },

    /// The operation exceeded its processing-time budget.
    #[error("processing timeout exceeded")]
    ProcessingTimeout,

    /// The inbound queue is saturated and the request was shed.
    #[error("queue backpressure")]
    QueueBackpressure,

    /// A configured cap (selection/element/user) was exceeded.
    #[error("limit exceeded: {kind}")]
    LimitExceeded {
        /// Which configured limit was hit.
        kind: String,
    },

    /// A conflict requires a human decision before it can resolve.
    #[error("conflict {conflict_id} requires manual resolution")]
    ConflictManualRequired {
        /// The conflict awaiting external resolution.
        conflict_id: uuid::Uuid,
    },

    /// The transaction could not be committed in its current state.
    #[error("invalid transaction: {reason}")]
    TransactionInvalid {
        /// Human-readable reason.
        reason: String,
    },

    /// The operation was superseded or explicitly cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Last-resort error for conditions the rest of the enum doesn't name.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// How severely a client is over its rate limit, used to scale log noise and
/// eventual abuse scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSeverity {
    /// First overage in the current window.
    Minor,
    /// Repeated overage within the abuse-detection window.
    Repeated,
}

impl std::fmt::Display for RateLimitSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitSeverity::Minor => write!(f, "minor"),
            RateLimitSeverity::Repeated => write!(f, "repeated"),
        }
    }
}

impl Error {
    /// Whether a submitter may usefully retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::ProcessingTimeout | Error::QueueBackpressure
        )
    }

    /// Whether this error represents a conflict parked for manual resolution.
    pub fn is_manual(&self) -> bool {
        matches!(self, Error::ConflictManualRequired { .. })
    }

    /// Suggested retry-after duration, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after_ms, .. } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(Error::ProcessingTimeout.is_retryable());
        assert!(Error::QueueBackpressure.is_retryable());
        assert!(Error::RateLimited {
            retry_after_ms: 10,
            severity: RateLimitSeverity::Minor
        }
        .is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn manual_conflict_detection() {
        let err = Error::ConflictManualRequired {
            conflict_id: uuid::Uuid::nil(),
        };
        assert!(err.is_manual());
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_messages_are_stable() {
        let msg = Error::LimitExceeded {
            kind: "max_elements_per_selection".into(),
        }
        .to_string();
        assert!(msg.contains("max_elements_per_selection"));
    }
}
