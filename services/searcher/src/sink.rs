//! Persistence/metrics sink boundary.
//!
//! The core emits every admission decision and every execution outcome to
//! the sink; storage and analytics live on the other side. The sink is
//! never consulted for correctness decisions.

use async_trait::async_trait;
use tracing::info;

use types::{Decision, ExecutionOutcome};

#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn on_decision(&self, decision: &Decision);
    async fn on_outcome(&self, outcome: &ExecutionOutcome);
}

/// Default sink: structured logs only.
pub struct TracingSink;

#[async_trait]
impl DecisionSink for TracingSink {
    async fn on_decision(&self, decision: &Decision) {
        match decision {
            Decision::Admitted {
                opportunity_id,
                strategy,
                composite_score,
                position_size_wei,
            } => info!(
                opportunity_id = *opportunity_id,
                strategy = %strategy,
                composite_score = *composite_score,
                position_wei = %position_size_wei,
                "decision: admitted"
            ),
            Decision::Rejected {
                opportunity_id,
                strategy,
                reason,
            } => info!(
                opportunity_id = *opportunity_id,
                strategy = %strategy,
                reason = %reason,
                "decision: rejected"
            ),
        }
    }

    async fn on_outcome(&self, outcome: &ExecutionOutcome) {
        info!(
            opportunity_id = outcome.opportunity_id,
            strategy = %outcome.strategy,
            success = outcome.success,
            profit_eth = outcome.realized_profit_eth,
            gas_used = outcome.gas_used,
            failure = outcome.failure.map(|f| f.as_str()).unwrap_or("none"),
            "outcome recorded"
        );
    }
}
