//! Candidate profitable actions produced by strategies.
//!
//! The shared fields every strategy must fill live on [`Opportunity`];
//! kind-specific payloads live in the [`OpportunityKind`] tagged union and
//! are pattern-matched at the execution-engine boundary.

use chrono::{DateTime, Duration, Utc};
use ethers::types::{Address, Bytes, TxHash, U256};

/// One hop of a swap route.
#[derive(Debug, Clone)]
pub struct SwapLeg {
    pub venue: String,
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
}

/// Kind-specific payload, selected by explicit pattern matching when the
/// execution engine builds transactions.
#[derive(Debug, Clone)]
pub enum OpportunityKind {
    Arbitrage {
        path: Vec<SwapLeg>,
    },
    Sandwich {
        victim_tx: TxHash,
        router: Address,
        token_in: Address,
        token_out: Address,
        front_amount_wei: U256,
    },
    Liquidation {
        protocol: Address,
        account: Address,
        debt_asset: Address,
        collateral_asset: Address,
        repay_amount_wei: U256,
    },
    FlashLoan {
        provider: Address,
        asset: Address,
        amount_wei: U256,
        params: Bytes,
    },
    CrossChain {
        source_chain_id: u64,
        dest_chain_id: u64,
        bridge: Address,
    },
}

impl OpportunityKind {
    /// Stable label used for logging, per-strategy accounting and sizing
    /// multipliers.
    pub fn label(&self) -> &'static str {
        match self {
            OpportunityKind::Arbitrage { .. } => "arbitrage",
            OpportunityKind::Sandwich { .. } => "sandwich",
            OpportunityKind::Liquidation { .. } => "liquidation",
            OpportunityKind::FlashLoan { .. } => "flashloan",
            OpportunityKind::CrossChain { .. } => "crosschain",
        }
    }

    /// Kinds that are inherently adversarial and should never be executed
    /// from the main wallet.
    pub fn is_adversarial(&self) -> bool {
        matches!(self, OpportunityKind::Sandwich { .. })
    }
}

/// Market context a strategy attaches so the risk checks do not need to
/// re-derive venue state.
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    /// Risk score per involved token, 0 (safe) to 10 (avoid).
    pub token_risk_scores: Vec<f64>,
    /// Risk score per involved venue, same scale.
    pub venue_risk_scores: Vec<f64>,
    /// Estimated slippage for the intended size, in percent.
    pub expected_slippage_pct: f64,
    /// Liquidity available on the route, in wei of the traded asset.
    pub available_liquidity_wei: U256,
}

/// A candidate profitable action with an expiry.
///
/// Consumed exactly once by admission control; discarded after the decision.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: u64,
    /// Tag of the strategy that produced this opportunity.
    pub strategy: String,
    pub kind: OpportunityKind,
    pub expected_profit_wei: U256,
    pub required_amount_wei: U256,
    pub gas_estimate: u64,
    /// Strategy confidence in the estimate, 0.0 to 1.0.
    pub confidence: f64,
    /// Scheduling priority, higher is more urgent.
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub market: MarketContext,
}

impl Opportunity {
    /// Default lifetime between creation and expiry.
    pub const DEFAULT_HORIZON_SECS: i64 = 5;

    /// Expiry is checked against the clock, not reconstructed from the
    /// horizon, so queueing delay counts against the opportunity.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime at `now`; zero when already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunity(expires_in_secs: i64) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            strategy: "test".to_string(),
            kind: OpportunityKind::Arbitrage { path: Vec::new() },
            expected_profit_wei: U256::exp10(16),
            required_amount_wei: U256::exp10(18),
            gas_estimate: 300_000,
            confidence: 0.8,
            priority: 100,
            created_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            market: MarketContext::default(),
        }
    }

    #[test]
    fn expiry_is_clock_based() {
        let opp = opportunity(5);
        assert!(!opp.is_expired(Utc::now()));
        assert!(opp.is_expired(opp.expires_at));
        assert!(opp.is_expired(opp.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn sandwich_is_adversarial() {
        let kind = OpportunityKind::Sandwich {
            victim_tx: TxHash::zero(),
            router: Address::zero(),
            token_in: Address::zero(),
            token_out: Address::zero(),
            front_amount_wei: U256::zero(),
        };
        assert!(kind.is_adversarial());
        assert!(!OpportunityKind::Arbitrage { path: Vec::new() }.is_adversarial());
    }
}
