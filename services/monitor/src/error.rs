//! Error types for the monitor service.

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for provider pool and monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A single RPC call against one provider failed.
    #[error("RPC error from provider {provider}: {message}")]
    Rpc {
        /// Name of the provider that failed
        provider: String,
        /// Underlying error message
        message: String,
    },

    /// An RPC call exceeded its deadline.
    #[error("RPC timeout on provider {provider} after {timeout_ms}ms")]
    Timeout {
        /// Name of the provider that timed out
        provider: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Every provider in the pool failed the operation. Callers retry in
    /// place; this is not fatal to the process.
    #[error("all {attempts} providers failed, last error: {last}")]
    AllProvidersFailed {
        /// Providers tried before giving up
        attempts: usize,
        /// The final provider's error
        last: Box<MonitorError>,
    },

    /// The pool has no provider satisfying the request (e.g. no healthy
    /// endpoint, or no endpoint with a WebSocket URL).
    #[error("no usable provider: {0}")]
    NoUsableProvider(String),

    /// WebSocket subscription ended or could not be established.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Malformed on-chain data; the item is dropped, never fatal.
    #[error("undecodable data: {0}")]
    Undecodable(String),
}

impl MonitorError {
    /// Transient infra errors are recovered locally via fallback/retry and
    /// never surfaced to the pipeline as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::Rpc { .. }
                | MonitorError::Timeout { .. }
                | MonitorError::AllProvidersFailed { .. }
                | MonitorError::Subscription(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_are_not_recoverable() {
        assert!(!MonitorError::Undecodable("bad calldata".into()).is_recoverable());
        assert!(MonitorError::Subscription("closed".into()).is_recoverable());
        let all = MonitorError::AllProvidersFailed {
            attempts: 3,
            last: Box::new(MonitorError::Rpc {
                provider: "backup-2".into(),
                message: "connection refused".into(),
            }),
        };
        assert!(all.is_recoverable());
    }
}
