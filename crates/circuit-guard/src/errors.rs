//! Error types for circuit breaker operations

use crate::machine::State;
use std::error::Error;
use thiserror::Error;

/// Errors returned from a guarded call
///
/// `Open` and `TooManyRequests` mean the operation was never invoked; callers
/// should treat them as "try later". `Execution` carries the operation's own
/// error untouched.
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, calls are being rejected
    #[error("Circuit '{circuit}' is open")]
    Open { circuit: String },

    /// Half-open probe quota for this generation is used up
    #[error("Circuit '{circuit}' half-open request limit reached (limit: {max_requests})")]
    TooManyRequests { circuit: String, max_requests: u32 },

    /// Outcome could not be applied to the state machine
    #[error("Circuit '{circuit}' has no transition for '{event}' in state {state}")]
    InvalidTransition {
        circuit: String,
        state: State,
        event: &'static str,
    },

    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// `true` when the breaker refused the call without running it
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CircuitError::Open { .. } | CircuitError::TooManyRequests { .. }
        )
    }

    /// The operation's own error, if that is what this is
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Upstream;

    impl fmt::Display for Upstream {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("upstream unavailable")
        }
    }

    impl Error for Upstream {}

    #[test]
    fn test_display_messages() {
        let open: CircuitError<Upstream> = CircuitError::Open {
            circuit: "payments".to_string(),
        };
        assert_eq!(open.to_string(), "Circuit 'payments' is open");

        let limited: CircuitError<Upstream> = CircuitError::TooManyRequests {
            circuit: "payments".to_string(),
            max_requests: 2,
        };
        assert_eq!(
            limited.to_string(),
            "Circuit 'payments' half-open request limit reached (limit: 2)"
        );

        let invalid: CircuitError<Upstream> = CircuitError::InvalidTransition {
            circuit: "payments".to_string(),
            state: State::Open,
            event: "ok",
        };
        assert_eq!(
            invalid.to_string(),
            "Circuit 'payments' has no transition for 'ok' in state Open"
        );
    }

    #[test]
    fn test_execution_exposes_source() {
        let err = CircuitError::Execution(Upstream);

        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("upstream unavailable".to_string())
        );
        assert!(!err.is_rejection());
        assert!(err.into_execution().is_some());
    }

    #[test]
    fn test_rejections() {
        let open: CircuitError<Upstream> = CircuitError::Open {
            circuit: "a".to_string(),
        };
        assert!(open.is_rejection());
        assert!(open.source().is_none());
    }
}
