//! Execution layer error types.

use thiserror::Error;
use vigil_domain::OrderId;

/// Errors reported by a broker adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Broker unreachable or returned a server error
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Order refused by the broker
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Unknown order ID
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
}

/// Errors reported by the price-series or signal collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Source unreachable or failed
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Source returned data that could not be read
    #[error("Provider returned unreadable data: {0}")]
    Invalid(String),

    /// Local I/O failure (file-backed providers)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during reconciliation and execution.
///
/// Broker failures carry the step and order they happened on, so the next
/// cycle (or an operator) knows where the sequence stopped.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Broker call failed
    #[error("Broker call failed during {step} (order {}): {source}", .order_id.as_deref().unwrap_or("-"))]
    Broker {
        /// What was being done
        step: &'static str,
        /// Order involved, if any
        order_id: Option<OrderId>,
        /// Underlying failure
        #[source]
        source: BrokerError,
    },

    /// Broker call did not answer in time
    #[error("Timeout after {secs}s during {step} (order {})", .order_id.as_deref().unwrap_or("-"))]
    Timeout {
        /// What was being done
        step: &'static str,
        /// Order involved, if any
        order_id: Option<OrderId>,
        /// Configured timeout
        secs: u64,
    },

    /// Local record and requested action disagree
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] vigil_domain::DomainError),
}

impl ExecError {
    /// Broker-side failure that the next cycle may retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecError::Timeout { .. }
                | ExecError::Broker { source: BrokerError::Unavailable(_), .. }
        )
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_error_display_carries_context() {
        let err = ExecError::Broker {
            step: "cancel protective order",
            order_id: Some("STUB-3".into()),
            source: BrokerError::Unavailable("502".into()),
        };
        assert_eq!(
            err.to_string(),
            "Broker call failed during cancel protective order (order STUB-3): Broker unavailable: 502"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_timeout_without_order() {
        let err = ExecError::Timeout { step: "get position", order_id: None, secs: 10 };
        assert_eq!(err.to_string(), "Timeout after 10s during get position (order -)");
        assert!(err.is_transient());
        assert!(!ExecError::InconsistentState("x".into()).is_transient());
    }
}
