//! The execution engine: approved opportunity in, exactly one terminal
//! outcome out.
//!
//! Pipeline per opportunity: wallet selection → contiguous nonce
//! reservation → per-kind transaction building → simulation gate →
//! dispatch (standard broadcast / relay bundle / flash-loan call) →
//! receipt reconciliation. The engine itself never loop-retries: provider
//! errors already exhausted the pool's fallback depth, and reverted or
//! rejected plans are terminal for the opportunity instance. The caller
//! reports each returned outcome to the circuit breaker exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, TxHash, H256, U256,
};
use ethers::utils::keccak256;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use chain_monitor::ProviderPool;
use config::SentinelConfig;
use types::{
    wei_to_eth, DispatchMode, ExecutionOutcome, ExecutionPlan, Opportunity, RiskAssessment,
};

use crate::builder::TxBuilder;
use crate::error::{ExecutionError, Result};
use crate::nonce::NonceManager;
use crate::relay::RelayApi;
use crate::simulator::Simulator;
use crate::wallet::WalletManager;

/// Strategy-supplied profit reconciliation: parses transfer/position
/// events out of the receipt. Falls back to the estimate-minus-gas rule
/// when absent or when it declines to answer.
pub trait ProfitCalculator: Send + Sync {
    fn calculate_profit(&self, receipt: &TransactionReceipt, opp: &Opportunity) -> Option<f64>;
}

/// Completion event emitted by the flash-loan entry point:
/// `FlashLoanExecuted(address indexed initiator, uint256 profit)`.
const FLASHLOAN_COMPLETED_SIG: &str = "FlashLoanExecuted(address,uint256)";

/// Engine counters for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: u64,
}

pub struct ExecutionEngine {
    pool: Arc<ProviderPool>,
    wallets: WalletManager,
    nonces: NonceManager,
    builder: TxBuilder,
    simulator: Simulator,
    relay: Arc<dyn RelayApi>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    broadcast_top_k: usize,
    bundle_blocks_ahead: u64,
    inclusion_poll_blocks: u64,
    max_concurrent: usize,
    limiter: Arc<Semaphore>,
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ExecutionEngine {
    pub fn new(
        config: &SentinelConfig,
        pool: Arc<ProviderPool>,
        relay: Arc<dyn RelayApi>,
    ) -> Result<Self> {
        let execution = &config.execution;
        let wallets = WalletManager::new(
            &config.wallet.main_private_key,
            execution.chain_id,
            execution.burner_count,
            execution.burner_risk_threshold,
        )?;

        Ok(Self {
            wallets,
            nonces: NonceManager::new(pool.clone()),
            builder: TxBuilder::new(execution)?,
            simulator: Simulator::new(pool.clone(), execution.min_sim_profit_eth),
            pool,
            relay,
            confirmation_timeout: Duration::from_secs(execution.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(execution.poll_interval_ms.max(10)),
            broadcast_top_k: execution.broadcast_top_k,
            bundle_blocks_ahead: execution.bundle_blocks_ahead,
            inclusion_poll_blocks: config.relay.inclusion_poll_blocks,
            max_concurrent: execution.max_concurrent.max(1),
            limiter: Arc::new(Semaphore::new(execution.max_concurrent.max(1))),
            executed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: (self.max_concurrent - self.limiter.available_permits()) as u64,
        }
    }

    /// Execute one approved opportunity to its terminal outcome. Blocks
    /// while the engine is at its concurrent-execution cap.
    pub async fn execute(
        &self,
        opp: &Opportunity,
        assessment: &RiskAssessment,
        profit_calc: Option<&dyn ProfitCalculator>,
    ) -> ExecutionOutcome {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("execution semaphore closed");
        self.executed.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let outcome = match self.try_execute(opp, assessment, profit_calc).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    id = opp.id,
                    strategy = %opp.strategy,
                    error = %e,
                    kind = e.failure_kind().as_str(),
                    "execution failed"
                );
                ExecutionOutcome::failed(opp.id, opp.strategy.clone(), e.failure_kind())
            }
        };

        if outcome.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                id = opp.id,
                strategy = %opp.strategy,
                profit_eth = outcome.realized_profit_eth,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "💰 execution succeeded"
            );
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    async fn try_execute(
        &self,
        opp: &Opportunity,
        assessment: &RiskAssessment,
        profit_calc: Option<&dyn ProfitCalculator>,
    ) -> Result<ExecutionOutcome> {
        let gas_price = self.pool.gas_price().await?;
        let head = self.pool.block_number().await?;
        let target_block = head + self.bundle_blocks_ahead;

        let wallet = self
            .wallets
            .select(&opp.kind, assessment.composite_score)
            .clone();

        let (mut txs, dispatch) =
            self.builder
                .build(opp, assessment.position_size_wei, gas_price, target_block)?;
        self.fill_gas_limits(&mut txs, wallet.address()).await?;

        let nonce_start = self.nonces.reserve(wallet.address(), txs.len() as u64).await?;
        let plan = ExecutionPlan {
            opportunity_id: opp.id,
            strategy: opp.strategy.clone(),
            wallet: wallet.address(),
            nonce_start,
            txs,
            dispatch,
        };
        debug!(
            id = opp.id,
            wallet = %plan.wallet,
            nonces = ?plan.nonce_range(),
            txs = plan.txs.len(),
            ?dispatch,
            "execution plan built"
        );

        let signed = self.sign_plan(&wallet, &plan).await?;

        match dispatch {
            DispatchMode::Standard => {
                self.simulator.simulate_single(&plan, plan.wallet).await?;
                let raw = signed[0].0.clone();
                let tx_hash = self.broadcast(raw, plan.wallet).await?;
                let receipt = self
                    .await_confirmation(tx_hash, plan.wallet, plan.nonce_start)
                    .await?;
                Ok(self.reconcile(opp, &plan, receipt, profit_calc, None))
            }

            DispatchMode::Bundle { target_block } => {
                let raw: Vec<Bytes> = signed.iter().map(|(b, _)| b.clone()).collect();
                let sim = self.relay.simulate(&raw, head).await?;
                if !sim.success {
                    return Err(ExecutionError::SimulationRejected {
                        reason: format!(
                            "bundle transaction {} reverts in simulation",
                            sim.reverted_at.unwrap_or_default()
                        ),
                    });
                }
                self.simulator.enforce_bundle_floor(sim.profit_wei, &plan)?;

                let bundle_hash = self.relay.submit(&raw, target_block, None, None).await?;
                let receipt = self
                    .await_bundle_inclusion(signed[0].1, target_block)
                    .await?;
                Ok(self.reconcile(opp, &plan, receipt, profit_calc, Some(bundle_hash)))
            }

            DispatchMode::FlashLoanCall => {
                self.simulator.simulate_single(&plan, plan.wallet).await?;
                let raw = signed[0].0.clone();
                let tx_hash = self.broadcast(raw, plan.wallet).await?;
                let receipt = self
                    .await_confirmation(tx_hash, plan.wallet, plan.nonce_start)
                    .await?;

                // Success needs both status 1 and the completion event.
                let Some(event_profit) = decode_flashloan_profit(&receipt) else {
                    return Err(ExecutionError::Reverted {
                        tx_hash: format!("{:?} (no completion event)", receipt.transaction_hash),
                    });
                };
                let mut outcome = self.reconcile(opp, &plan, receipt, profit_calc, None);
                if profit_calc.is_none() {
                    let gas_cost =
                        outcome.gas_used as f64 * wei_to_eth(plan.txs[0].gas_price_wei);
                    outcome.realized_profit_eth = wei_to_eth(event_profit) - gas_cost;
                }
                Ok(outcome)
            }
        }
    }

    /// Estimate gas for any transaction the builder left unbounded (a
    /// strategy may emit opportunities without a gas estimate).
    async fn fill_gas_limits(
        &self,
        txs: &mut [types::PlannedTx],
        from: Address,
    ) -> Result<()> {
        for tx in txs.iter_mut().filter(|t| t.gas_limit == 0) {
            let request = TransactionRequest::new()
                .from(from)
                .to(tx.to)
                .data(tx.data.clone())
                .value(tx.value);
            let typed: TypedTransaction = request.into();
            tx.gas_limit = self.pool.estimate_gas(typed).await?;
        }
        Ok(())
    }

    /// Sign every planned transaction with its reserved nonce. Returns the
    /// raw RLP alongside the resulting transaction hash.
    async fn sign_plan(
        &self,
        wallet: &LocalWallet,
        plan: &ExecutionPlan,
    ) -> Result<Vec<(Bytes, TxHash)>> {
        let mut signed = Vec::with_capacity(plan.txs.len());
        for (offset, tx) in plan.txs.iter().enumerate() {
            let request = TransactionRequest::new()
                .from(plan.wallet)
                .to(tx.to)
                .data(tx.data.clone())
                .value(tx.value)
                .gas(tx.gas_limit)
                .gas_price(tx.gas_price_wei)
                .nonce(plan.nonce_start + offset as u64)
                .chain_id(wallet.chain_id());
            let typed: TypedTransaction = request.into();
            let signature = wallet
                .sign_transaction(&typed)
                .await
                .map_err(|e| ExecutionError::Signing(e.to_string()))?;
            let raw = typed.rlp_signed(&signature);
            let hash = TxHash::from(keccak256(&raw));
            signed.push((raw, hash));
        }
        Ok(signed)
    }

    /// Broadcast through the pool; a nonce-shaped rejection invalidates
    /// the wallet's counter so the next plan reseeds from the chain.
    async fn broadcast(&self, raw: Bytes, wallet: Address) -> Result<TxHash> {
        match self.pool.broadcast(raw, self.broadcast_top_k).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                if e.to_string().to_lowercase().contains("nonce") {
                    self.nonces.invalidate(wallet).await;
                }
                Err(e.into())
            }
        }
    }

    /// Wait for one confirmation with a bounded timeout, tolerating
    /// transaction replacement: if the reserved nonce was consumed by a
    /// different hash, tracking switches to the replacement's receipt.
    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        wallet: Address,
        nonce: u64,
    ) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + self.confirmation_timeout;
        let mut tracked = tx_hash;

        loop {
            if Instant::now() >= deadline {
                return Err(ExecutionError::Timeout {
                    secs: self.confirmation_timeout.as_secs(),
                });
            }

            match self.pool.transaction_receipt(tracked).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(1u64.into()) {
                        return Ok(receipt);
                    }
                    return Err(ExecutionError::Reverted {
                        tx_hash: format!("{tracked:?}"),
                    });
                }
                Ok(None) => {
                    if let Some(replacement) = self.find_replacement(wallet, nonce, tracked).await {
                        info!(
                            original = %tracked,
                            replacement = %replacement,
                            "transaction replaced, tracking replacement receipt"
                        );
                        tracked = replacement;
                        continue;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "receipt poll failed, retrying within deadline");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Scan the latest block for a transaction from `wallet` consuming the
    /// same nonce under a different hash.
    async fn find_replacement(
        &self,
        wallet: Address,
        nonce: u64,
        current: TxHash,
    ) -> Option<TxHash> {
        let block = self
            .pool
            .block_with_txs(BlockNumber::Latest.into())
            .await
            .ok()??;
        block
            .transactions
            .iter()
            .find(|t| t.from == wallet && t.nonce == U256::from(nonce) && t.hash != current)
            .map(|t| t.hash)
    }

    /// Poll for bundle inclusion, bounded by target-block arrival plus a
    /// small grace window.
    async fn await_bundle_inclusion(
        &self,
        first_tx_hash: TxHash,
        target_block: u64,
    ) -> Result<TransactionReceipt> {
        let give_up_after = target_block + self.inclusion_poll_blocks;

        loop {
            if let Ok(Some(receipt)) = self.pool.transaction_receipt(first_tx_hash).await {
                if receipt.status == Some(1u64.into()) {
                    return Ok(receipt);
                }
                return Err(ExecutionError::Reverted {
                    tx_hash: format!("{first_tx_hash:?}"),
                });
            }

            let head = self.pool.block_number().await?;
            if head > give_up_after {
                return Err(ExecutionError::NotIncluded { target_block });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Compute the terminal outcome from a successful receipt. Prefers the
    /// strategy's profit calculator; falls back to
    /// `expected_profit − gas_used × effective_gas_price`.
    fn reconcile(
        &self,
        opp: &Opportunity,
        plan: &ExecutionPlan,
        receipt: TransactionReceipt,
        profit_calc: Option<&dyn ProfitCalculator>,
        bundle_hash: Option<H256>,
    ) -> ExecutionOutcome {
        let gas_used = receipt.gas_used.unwrap_or_default().as_u64();
        let effective_gas_price = receipt
            .effective_gas_price
            .unwrap_or(plan.txs[0].gas_price_wei);
        let gas_cost_eth = wei_to_eth(effective_gas_price * U256::from(gas_used));

        let realized_profit_eth = profit_calc
            .and_then(|calc| calc.calculate_profit(&receipt, opp))
            .unwrap_or_else(|| wei_to_eth(opp.expected_profit_wei) - gas_cost_eth);

        ExecutionOutcome {
            opportunity_id: opp.id,
            strategy: opp.strategy.clone(),
            success: true,
            tx_hash: Some(receipt.transaction_hash),
            bundle_hash,
            realized_profit_eth,
            gas_used,
            failure: None,
        }
    }
}

/// Extract the profit word from the flash-loan completion event, if the
/// receipt carries one.
fn decode_flashloan_profit(receipt: &TransactionReceipt) -> Option<U256> {
    let topic = H256::from(keccak256(FLASHLOAN_COMPLETED_SIG.as_bytes()));
    receipt
        .logs
        .iter()
        .find(|log| log.topics.first() == Some(&topic))
        .and_then(|log| {
            if log.data.len() >= 32 {
                Some(U256::from_big_endian(&log.data[..32]))
            } else {
                None
            }
        })
}
