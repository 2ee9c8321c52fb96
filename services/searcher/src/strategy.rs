//! The strategy boundary.
//!
//! Strategies are external to the core: they subscribe to monitor topics,
//! turn events into opportunities, and may supply a profit calculator used
//! during outcome reconciliation. The pipeline treats them as a fan-in
//! channel of typed [`Opportunity`] records and nothing more.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ethers::types::U256;

use execution::ProfitCalculator;
use types::{
    ChainEvent, EventTopic, MarketContext, Opportunity, OpportunityKind, SwapLeg, TxClass,
};

/// A pluggable opportunity producer.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable tag carried on every opportunity this strategy emits.
    fn name(&self) -> &str;

    /// Topics this strategy wants delivered.
    fn subscriptions(&self) -> Vec<EventTopic>;

    /// React to one event; zero or more opportunities out.
    async fn on_event(&self, event: &ChainEvent) -> Vec<Opportunity>;

    /// Optional receipt-based profit reconciliation.
    fn profit_calculator(&self) -> Option<Arc<dyn ProfitCalculator>> {
        None
    }
}

/// Reference strategy: reacts to high-value swaps against monitored
/// routers by emitting a fixed-shape backrun arbitrage opportunity.
///
/// Deliberately simple: it exists to exercise the pipeline end to end
/// and as a template for real strategy crates.
pub struct HighValueWatcher {
    next_id: AtomicU64,
    expected_profit_wei: U256,
    gas_estimate: u64,
    horizon_secs: i64,
}

impl HighValueWatcher {
    pub fn new(expected_profit_wei: U256, gas_estimate: u64) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            expected_profit_wei,
            gas_estimate,
            horizon_secs: Opportunity::DEFAULT_HORIZON_SECS,
        }
    }
}

#[async_trait]
impl Strategy for HighValueWatcher {
    fn name(&self) -> &str {
        "high-value-watcher"
    }

    fn subscriptions(&self) -> Vec<EventTopic> {
        vec![EventTopic::HighValue]
    }

    async fn on_event(&self, event: &ChainEvent) -> Vec<Opportunity> {
        let ChainEvent::Transaction(observed) = event else {
            return Vec::new();
        };
        // Only swaps are worth backrunning; a plain high-value transfer
        // moves no pool price.
        if !observed.classes.contains(&TxClass::Swap) {
            return Vec::new();
        }
        let Some(router) = observed.tx.to else {
            return Vec::new();
        };

        let now = Utc::now();
        vec![Opportunity {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            strategy: self.name().to_string(),
            kind: OpportunityKind::Arbitrage {
                path: vec![SwapLeg {
                    venue: "observed-router".to_string(),
                    pool: router,
                    token_in: observed.tx.from,
                    token_out: router,
                }],
            },
            expected_profit_wei: self.expected_profit_wei,
            // Commit a fraction of the observed size; the backrun does not
            // need to match the victim's notional.
            required_amount_wei: observed.tx.value / U256::from(10u64),
            gas_estimate: self.gas_estimate,
            confidence: 0.8,
            priority: 150,
            created_at: now,
            expires_at: now + Duration::seconds(self.horizon_secs),
            market: MarketContext {
                token_risk_scores: vec![2.0],
                venue_risk_scores: vec![1.0],
                expected_slippage_pct: 0.4,
                available_liquidity_wei: observed.tx.value * U256::from(50u64),
            },
        }]
    }
}
