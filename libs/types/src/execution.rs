//! Execution plans and terminal outcomes.

use std::ops::Range;

use ethers::types::{Address, Bytes, H256, U256};

/// How an execution plan is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Sign and broadcast through the provider pool, wait for one
    /// confirmation.
    Standard,
    /// Ordered atomic submission to a private relay for a specific block.
    Bundle { target_block: u64 },
    /// Single on-chain entry point that runs provider callback logic.
    FlashLoanCall,
}

/// One transaction of a plan, ready to be signed.
#[derive(Debug, Clone)]
pub struct PlannedTx {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price_wei: U256,
}

/// One or more transactions derived from an approved opportunity.
///
/// Invariant: nonces are contiguous from `nonce_start` and reserved
/// exclusively for this plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub opportunity_id: u64,
    pub strategy: String,
    pub wallet: Address,
    pub nonce_start: u64,
    pub txs: Vec<PlannedTx>,
    pub dispatch: DispatchMode,
}

impl ExecutionPlan {
    /// Nonces this plan owns: `nonce_start .. nonce_start + txs.len()`.
    pub fn nonce_range(&self) -> Range<u64> {
        self.nonce_start..self.nonce_start + self.txs.len() as u64
    }
}

/// Failure classification for a finished execution. Only `ProviderError`
/// is eligible for a caller-level retry; the rest are terminal for the
/// opportunity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SimulationRejected,
    Reverted,
    NotIncluded,
    Timeout,
    ProviderError,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::ProviderError)
    }

    /// Stable wire string for logs and the persistence sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SimulationRejected => "simulation-rejected",
            FailureKind::Reverted => "reverted",
            FailureKind::NotIncluded => "not-included",
            FailureKind::Timeout => "timeout",
            FailureKind::ProviderError => "provider-error",
        }
    }
}

/// Terminal result of one execution plan. Produced exactly once and fed to
/// the circuit breaker and the persistence sink.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub opportunity_id: u64,
    pub strategy: String,
    pub success: bool,
    pub tx_hash: Option<H256>,
    pub bundle_hash: Option<H256>,
    /// Only meaningful when `success` is true.
    pub realized_profit_eth: f64,
    pub gas_used: u64,
    pub failure: Option<FailureKind>,
}

impl ExecutionOutcome {
    pub fn failed(opportunity_id: u64, strategy: String, kind: FailureKind) -> Self {
        Self {
            opportunity_id,
            strategy,
            success: false,
            tx_hash: None,
            bundle_hash: None,
            realized_profit_eth: 0.0,
            gas_used: 0,
            failure: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_range_is_contiguous() {
        let tx = PlannedTx {
            to: Address::zero(),
            data: Bytes::new(),
            value: U256::zero(),
            gas_limit: 21_000,
            gas_price_wei: U256::exp10(9),
        };
        let plan = ExecutionPlan {
            opportunity_id: 7,
            strategy: "test".to_string(),
            wallet: Address::zero(),
            nonce_start: 42,
            txs: vec![tx.clone(), tx],
            dispatch: DispatchMode::Bundle { target_block: 100 },
        };
        assert_eq!(plan.nonce_range(), 42..44);
    }

    #[test]
    fn only_provider_error_is_retryable() {
        assert!(FailureKind::ProviderError.is_retryable());
        for kind in [
            FailureKind::SimulationRejected,
            FailureKind::Reverted,
            FailureKind::NotIncluded,
            FailureKind::Timeout,
        ] {
            assert!(!kind.is_retryable(), "{} must be terminal", kind.as_str());
        }
    }
}
