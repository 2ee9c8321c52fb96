//! Pipeline wiring: monitor topics → strategies → admission → execution →
//! outcome feedback.
//!
//! Each opportunity is processed as an independent concurrent unit of
//! work; a slow admission or execution never blocks ingestion. The
//! execution engine enforces the concurrent-execution cap internally, and
//! every terminal outcome is reported to admission control (ledger, trade
//! history, circuit breaker) exactly once, from exactly one place.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use chain_monitor::{ChainEventMonitor, MonitorStatsSnapshot, ProviderPool};
use execution::{ExecutionEngine, ProfitCalculator};
use risk::{AdmissionContext, AdmissionController, BreakerStatus};
use types::{Decision, Opportunity, ProviderHealthSnapshot};

use crate::sink::DecisionSink;
use crate::strategy::Strategy;

/// Capacity of the strategy fan-in channel.
const OPPORTUNITY_CHANNEL_CAPACITY: usize = 256;

/// Aggregated status query surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub breaker: BreakerStatus,
    pub providers: Vec<ProviderHealthSnapshot>,
    pub monitor: MonitorStatsSnapshot,
    pub engine: execution::EngineStatus,
}

pub struct PipelineEngine {
    pool: Arc<ProviderPool>,
    monitor: Arc<ChainEventMonitor>,
    admission: Arc<AdmissionController>,
    execution: Arc<ExecutionEngine>,
    sink: Arc<dyn DecisionSink>,
    strategies: Vec<Arc<dyn Strategy>>,
    /// Profit calculators by strategy tag, collected at registration.
    calculators: HashMap<String, Arc<dyn ProfitCalculator>>,
    /// Wallet whose balance backs admission sizing.
    funding_wallet: Address,
}

impl PipelineEngine {
    pub fn new(
        pool: Arc<ProviderPool>,
        monitor: Arc<ChainEventMonitor>,
        admission: Arc<AdmissionController>,
        execution: Arc<ExecutionEngine>,
        sink: Arc<dyn DecisionSink>,
        funding_wallet: Address,
    ) -> Self {
        Self {
            pool,
            monitor,
            admission,
            execution,
            sink,
            strategies: Vec::new(),
            calculators: HashMap::new(),
            funding_wallet,
        }
    }

    /// Register a strategy before `run`. Its subscriptions are wired when
    /// the pipeline starts.
    pub fn register_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        if let Some(calc) = strategy.profit_calculator() {
            self.calculators.insert(strategy.name().to_string(), calc);
        }
        info!(strategy = strategy.name(), "strategy registered");
        self.strategies.push(strategy);
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            breaker: self.admission.breaker().status(),
            providers: self.pool.snapshots(),
            monitor: self.monitor.stats_snapshot(),
            engine: self.execution.status(),
        }
    }

    /// Run the pipeline until the fan-in channel closes (i.e. every
    /// strategy task has stopped).
    pub async fn run(&self) {
        let (opp_tx, mut opp_rx) = mpsc::channel::<Opportunity>(OPPORTUNITY_CHANNEL_CAPACITY);

        for strategy in &self.strategies {
            for topic in strategy.subscriptions() {
                let receiver = self.monitor.subscribe(topic);
                let strategy = strategy.clone();
                let opp_tx = opp_tx.clone();
                tokio::spawn(async move {
                    forward_events(strategy, receiver, opp_tx).await;
                });
            }
        }
        // The pipeline's own sender would keep the channel open forever.
        drop(opp_tx);

        info!(strategies = self.strategies.len(), "pipeline running");

        while let Some(opportunity) = opp_rx.recv().await {
            let admission = self.admission.clone();
            let execution = self.execution.clone();
            let sink = self.sink.clone();
            let pool = self.pool.clone();
            let funding_wallet = self.funding_wallet;
            let calculator = self.calculators.get(&opportunity.strategy).cloned();

            tokio::spawn(async move {
                process_opportunity(
                    opportunity,
                    admission,
                    execution,
                    sink,
                    pool,
                    funding_wallet,
                    calculator,
                )
                .await;
            });
        }
        info!("opportunity channel closed, pipeline stopping");
    }
}

/// Deliver one strategy's subscription until the topic closes.
async fn forward_events(
    strategy: Arc<dyn Strategy>,
    mut receiver: broadcast::Receiver<types::ChainEvent>,
    opp_tx: mpsc::Sender<Opportunity>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                for opportunity in strategy.on_event(&event).await {
                    debug!(
                        strategy = strategy.name(),
                        id = opportunity.id,
                        "opportunity emitted"
                    );
                    if opp_tx.send(opportunity).await.is_err() {
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Freshness over completeness: dropped events were stale.
                warn!(strategy = strategy.name(), missed, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// One opportunity, admission to terminal outcome.
async fn process_opportunity(
    opportunity: Opportunity,
    admission: Arc<AdmissionController>,
    execution: Arc<ExecutionEngine>,
    sink: Arc<dyn DecisionSink>,
    pool: Arc<ProviderPool>,
    funding_wallet: Address,
    calculator: Option<Arc<dyn ProfitCalculator>>,
) {
    // Sample chain state once; admission itself never performs RPC.
    let (balance, gas_price) = match (
        pool.balance(funding_wallet).await,
        pool.gas_price().await,
    ) {
        (Ok(balance), Ok(gas_price)) => (balance, gas_price),
        (Err(e), _) | (_, Err(e)) => {
            warn!(id = opportunity.id, error = %e, "admission context unavailable, dropping with reason");
            sink.on_decision(&Decision::Rejected {
                opportunity_id: opportunity.id,
                strategy: opportunity.strategy.clone(),
                reason: types::RejectReason::CheckFailed {
                    name: "admission_context",
                    detail: format!("chain state unavailable: {e}"),
                },
            })
            .await;
            return;
        }
    };

    let assessment = admission.evaluate(
        &opportunity,
        AdmissionContext {
            balance_wei: balance,
            gas_price_wei: gas_price,
        },
    );

    if !assessment.approved {
        let reason = assessment
            .reject_reason
            .clone()
            .unwrap_or(types::RejectReason::Expired);
        sink.on_decision(&Decision::Rejected {
            opportunity_id: opportunity.id,
            strategy: opportunity.strategy.clone(),
            reason,
        })
        .await;
        return;
    }

    sink.on_decision(&Decision::Admitted {
        opportunity_id: opportunity.id,
        strategy: opportunity.strategy.clone(),
        composite_score: assessment.composite_score,
        position_size_wei: assessment.position_size_wei,
    })
    .await;

    let outcome = execution
        .execute(&opportunity, &assessment, calculator.as_deref())
        .await;

    // The single exactly-once feedback point: ledger, history, breaker.
    admission.record_outcome(&outcome);
    sink.on_outcome(&outcome).await;
}
