//! Error types for the execution engine.

use thiserror::Error;

use chain_monitor::MonitorError;
use types::FailureKind;

/// Result type alias for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Main error type for execution operations. Every variant maps onto a
/// [`FailureKind`] for outcome reporting; only provider errors are
/// retryable, and only through the provider pool's own fallback depth.
/// The engine never loop-retries a reverted transaction.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Simulation rejected the plan before submission.
    #[error("simulation rejected: {reason}")]
    SimulationRejected {
        /// Why the simulation gate refused the plan
        reason: String,
    },

    /// The transaction was mined but reverted.
    #[error("transaction reverted: {tx_hash}")]
    Reverted {
        /// Hash of the reverted transaction
        tx_hash: String,
    },

    /// The bundle was not included in its target block.
    #[error("bundle not included in block {target_block}")]
    NotIncluded {
        /// Block the bundle targeted
        target_block: u64,
    },

    /// Confirmation wait exceeded its bound.
    #[error("confirmation timeout after {secs}s")]
    Timeout {
        /// Bound that was exceeded, seconds
        secs: u64,
    },

    /// Provider pool failure, including total exhaustion.
    #[error("provider error: {0}")]
    Provider(#[from] MonitorError),

    /// Relay rejected or failed the bundle RPC.
    #[error("relay error: {0}")]
    Relay(String),

    /// Transaction signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// The opportunity kind has no execution path.
    #[error("unsupported opportunity kind: {0}")]
    UnsupportedKind(&'static str),
}

impl ExecutionError {
    /// Failure classification reported in the outcome.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExecutionError::SimulationRejected { .. }
            | ExecutionError::Signing(_)
            | ExecutionError::UnsupportedKind(_) => FailureKind::SimulationRejected,
            ExecutionError::Reverted { .. } => FailureKind::Reverted,
            ExecutionError::NotIncluded { .. } => FailureKind::NotIncluded,
            ExecutionError::Timeout { .. } => FailureKind::Timeout,
            ExecutionError::Provider(_) | ExecutionError::Relay(_) => FailureKind::ProviderError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_mapping() {
        let sim = ExecutionError::SimulationRejected {
            reason: "net profit below floor".to_string(),
        };
        assert_eq!(sim.failure_kind(), FailureKind::SimulationRejected);
        assert!(!sim.failure_kind().is_retryable());

        let provider = ExecutionError::Provider(MonitorError::NoUsableProvider(
            "no healthy provider".to_string(),
        ));
        assert_eq!(provider.failure_kind(), FailureKind::ProviderError);
        assert!(provider.failure_kind().is_retryable());
    }
}
