//! Simulation gate: the last correctness check before funds are at risk.
//!
//! Single-transaction plans are simulated with `eth_call` against latest
//! state; the executor contracts return realized profit as a `uint256`,
//! which must clear the configured floor net of gas, independent of
//! whatever the strategy estimated. Bundles are simulated whole by the
//! relay and rejected if any transaction in them reverts.

use std::sync::Arc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use tracing::debug;

use chain_monitor::ProviderPool;
use types::{wei_to_eth, ExecutionPlan};

use crate::error::{ExecutionError, Result};

pub struct Simulator {
    pool: Arc<ProviderPool>,
    min_profit_eth: f64,
}

impl Simulator {
    pub fn new(pool: Arc<ProviderPool>, min_profit_eth: f64) -> Self {
        Self {
            pool,
            min_profit_eth,
        }
    }

    /// Simulate a single-transaction plan. Returns the simulated gross
    /// profit in wei on success.
    pub async fn simulate_single(&self, plan: &ExecutionPlan, from: Address) -> Result<U256> {
        let tx = plan.txs.first().ok_or_else(|| {
            ExecutionError::SimulationRejected {
                reason: "empty plan".to_string(),
            }
        })?;

        let request = TransactionRequest::new()
            .from(from)
            .to(tx.to)
            .data(tx.data.clone())
            .value(tx.value)
            .gas(tx.gas_limit)
            .gas_price(tx.gas_price_wei);
        let typed: TypedTransaction = request.into();

        let output = self
            .pool
            .call(typed)
            .await
            .map_err(|e| ExecutionError::SimulationRejected {
                reason: format!("call reverted: {e}"),
            })?;

        let gross = decode_profit(&output).ok_or_else(|| ExecutionError::SimulationRejected {
            reason: "no profit data in simulation output".to_string(),
        })?;

        self.enforce_floor(gross, tx.gas_limit, tx.gas_price_wei)?;
        Ok(gross)
    }

    /// Check a relay-simulated bundle profit against the same floor.
    pub fn enforce_bundle_floor(&self, profit_wei: U256, plan: &ExecutionPlan) -> Result<()> {
        let gas: u64 = plan.txs.iter().map(|t| t.gas_limit).sum();
        let gas_price = plan
            .txs
            .first()
            .map(|t| t.gas_price_wei)
            .unwrap_or_default();
        self.enforce_floor(profit_wei, gas, gas_price)
    }

    fn enforce_floor(&self, gross_wei: U256, gas: u64, gas_price_wei: U256) -> Result<()> {
        let gas_cost_wei = gas_price_wei * U256::from(gas);
        let net_eth = wei_to_eth(gross_wei) - wei_to_eth(gas_cost_wei);
        debug!(
            gross_eth = wei_to_eth(gross_wei),
            gas_cost_eth = wei_to_eth(gas_cost_wei),
            net_eth,
            floor = self.min_profit_eth,
            "simulation profit gate"
        );
        if net_eth < self.min_profit_eth {
            return Err(ExecutionError::SimulationRejected {
                reason: format!(
                    "net profit {net_eth:.6} ETH below floor {:.6} ETH",
                    self.min_profit_eth
                ),
            });
        }
        Ok(())
    }
}

/// Executor contracts return profit as a single uint256.
fn decode_profit(output: &Bytes) -> Option<U256> {
    if output.len() < 32 {
        return None;
    }
    Some(U256::from_big_endian(&output[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_profit_requires_a_word() {
        assert_eq!(decode_profit(&Bytes::new()), None);
        let mut word = [0u8; 32];
        word[31] = 7;
        assert_eq!(decode_profit(&Bytes::from(word.to_vec())), Some(U256::from(7)));
    }
}
