//! Admission control: the single gate every opportunity passes before the
//! execution engine may touch it.
//!
//! Decision order: expiry (against the clock) → circuit breaker →
//! weighted checks → composite-score ceiling → position sizing. Every
//! rejection carries a machine-readable reason and is logged; once an
//! opportunity reaches this gate it is never silently dropped.

use chrono::Utc;
use ethers::types::U256;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use config::{BreakerConfig, RiskLimitsConfig};
use types::{
    eth_to_wei, wei_to_eth, ExecutionOutcome, Opportunity, RejectReason, RiskAssessment,
};

use crate::breaker::{CircuitBreaker, Permit};
use crate::checks::{composite_score, failure_detail, run_checks, CheckInputs};
use crate::history::{DailyLedger, TradeHistory};
use crate::sizing::PositionSizer;

/// Chain state the caller samples once per evaluation; admission control
/// itself never performs RPC.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext {
    pub balance_wei: U256,
    pub gas_price_wei: U256,
}

/// Owns the circuit breaker, the daily ledger and the trade history.
pub struct AdmissionController {
    config: RiskLimitsConfig,
    breaker: Arc<CircuitBreaker>,
    sizer: PositionSizer,
    ledger: Mutex<DailyLedger>,
    history: Mutex<TradeHistory>,
}

impl AdmissionController {
    pub fn new(config: RiskLimitsConfig, breaker_config: BreakerConfig) -> Self {
        let history_cap = config.kelly.history_cap;
        Self {
            sizer: PositionSizer::new(config.clone()),
            config,
            breaker: Arc::new(CircuitBreaker::new(breaker_config)),
            ledger: Mutex::new(DailyLedger::new(Utc::now())),
            history: Mutex::new(TradeHistory::new(history_cap)),
        }
    }

    /// Shared handle to the breaker for status queries.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Evaluate one opportunity. Consumes it conceptually: the same
    /// opportunity must not be resubmitted after a decision.
    pub fn evaluate(&self, opp: &Opportunity, ctx: AdmissionContext) -> RiskAssessment {
        let now = Utc::now();

        if opp.is_expired(now) {
            debug!(id = opp.id, strategy = %opp.strategy, "rejected: expired");
            return RiskAssessment::rejected(RejectReason::Expired);
        }

        match self.breaker.permit(&opp.strategy) {
            Permit::Allowed => {}
            Permit::GlobalOpen => {
                warn!(id = opp.id, strategy = %opp.strategy, "rejected: circuit open");
                return RiskAssessment::rejected(RejectReason::CircuitOpen);
            }
            Permit::StrategyDisabled => {
                warn!(id = opp.id, strategy = %opp.strategy, "rejected: strategy disabled");
                return RiskAssessment::rejected(RejectReason::StrategyDisabled {
                    strategy: opp.strategy.clone(),
                });
            }
        }

        let daily_loss_eth = {
            let mut ledger = self.ledger.lock();
            ledger.roll(now);
            ledger.loss_today_eth()
        };

        let inputs = CheckInputs {
            gas_price_gwei: wei_to_eth(ctx.gas_price_wei) * 1e9,
            daily_loss_eth,
        };
        let checks = run_checks(&self.config, opp, inputs);
        let score = composite_score(&checks);

        if let Some(failed) = checks.iter().find(|c| !c.passed) {
            let reason = RejectReason::CheckFailed {
                name: failed.name,
                detail: failure_detail(failed),
            };
            info!(
                id = opp.id,
                strategy = %opp.strategy,
                check = failed.name,
                score,
                reason = %reason,
                "opportunity rejected"
            );
            return RiskAssessment {
                approved: false,
                composite_score: score,
                checks,
                position_size_wei: U256::zero(),
                reject_reason: Some(reason),
            };
        }

        if score >= self.config.score_ceiling {
            let reason = RejectReason::ScoreTooHigh {
                score,
                ceiling: self.config.score_ceiling,
            };
            info!(id = opp.id, strategy = %opp.strategy, score, "opportunity rejected");
            return RiskAssessment {
                approved: false,
                composite_score: score,
                checks,
                position_size_wei: U256::zero(),
                reject_reason: Some(reason),
            };
        }

        let kelly = self.history.lock().kelly_inputs();
        let size_eth = self
            .sizer
            .size(wei_to_eth(ctx.balance_wei), opp, score, kelly);

        info!(
            id = opp.id,
            strategy = %opp.strategy,
            score,
            position_eth = size_eth,
            "opportunity admitted"
        );

        RiskAssessment {
            approved: true,
            composite_score: score,
            checks,
            position_size_wei: eth_to_wei(size_eth),
            reject_reason: None,
        }
    }

    /// Record a terminal execution outcome exactly once: ledger, trade
    /// history and circuit breaker all update here.
    pub fn record_outcome(&self, outcome: &ExecutionOutcome) {
        let profit = if outcome.success {
            outcome.realized_profit_eth
        } else {
            // A failed execution burns gas; treat unknown losses as zero
            // profit rather than fabricating a number.
            0.0
        };
        self.ledger.lock().record(Utc::now(), profit);
        self.history.lock().record(profit);
        self.breaker.record_outcome(&outcome.strategy, outcome.success);
    }

    /// Trades currently retained for the Kelly estimate.
    pub fn recorded_trades(&self) -> usize {
        self.history.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use types::{MarketContext, OpportunityKind};

    fn opportunity(expires_in_secs: i64) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            strategy: "arb".to_string(),
            kind: OpportunityKind::Arbitrage { path: Vec::new() },
            expected_profit_wei: eth_to_wei(0.02),
            required_amount_wei: eth_to_wei(1.0),
            gas_estimate: 300_000,
            confidence: 0.8,
            priority: 100,
            created_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            market: MarketContext {
                token_risk_scores: vec![2.0],
                venue_risk_scores: vec![1.0],
                expected_slippage_pct: 0.4,
                available_liquidity_wei: eth_to_wei(50.0),
            },
        }
    }

    fn context(gas_gwei: u64) -> AdmissionContext {
        AdmissionContext {
            balance_wei: eth_to_wei(10.0),
            gas_price_wei: types::gwei_to_wei(gas_gwei),
        }
    }

    fn controller() -> AdmissionController {
        AdmissionController::new(RiskLimitsConfig::default(), BreakerConfig::default())
    }

    #[test]
    fn healthy_opportunity_is_admitted_with_bounded_size() {
        let controller = controller();
        let assessment = controller.evaluate(&opportunity(5), context(30));
        assert!(assessment.approved, "reason: {:?}", assessment.reject_reason);
        assert!(assessment.composite_score < 7.0);

        let size_eth = wei_to_eth(assessment.position_size_wei);
        assert!(size_eth >= 0.05 && size_eth <= 5.0_f64.min(9.0));
    }

    #[test]
    fn expired_opportunity_is_rejected_regardless_of_risk() {
        let controller = controller();
        let assessment = controller.evaluate(&opportunity(-1), context(30));
        assert!(!assessment.approved);
        assert!(matches!(
            assessment.reject_reason,
            Some(RejectReason::Expired)
        ));
    }

    #[test]
    fn gas_ceiling_rejects_with_reason_string() {
        let controller = controller();
        let assessment = controller.evaluate(&opportunity(5), context(900));
        assert!(!assessment.approved);
        let reason = assessment.reject_reason.unwrap();
        assert_eq!(reason.to_string(), "Gas price too high");
        // The full check set is still reported alongside the rejection.
        assert_eq!(assessment.checks.len(), 8);
    }

    #[test]
    fn open_breaker_rejects_before_checks_run() {
        let controller = controller();
        for _ in 0..5 {
            controller.record_outcome(&ExecutionOutcome::failed(
                1,
                "arb".to_string(),
                types::FailureKind::Reverted,
            ));
        }
        let assessment = controller.evaluate(&opportunity(5), context(30));
        assert!(!assessment.approved);
        let reason = assessment.reject_reason.unwrap();
        assert_eq!(reason.to_string(), "circuit-open");
        assert!(assessment.checks.is_empty(), "checks must not run");
    }

    #[test]
    fn daily_loss_budget_blocks_after_heavy_losses() {
        let controller = controller();
        // Record a successful trade that lost money overall: realized
        // profit is negative and the ledger accumulates the loss.
        let mut outcome = ExecutionOutcome::failed(1, "arb".to_string(), types::FailureKind::Reverted);
        outcome.success = true;
        outcome.failure = None;
        outcome.realized_profit_eth = -1.5;
        controller.record_outcome(&outcome);

        let assessment = controller.evaluate(&opportunity(5), context(30));
        assert!(!assessment.approved);
        assert_eq!(
            assessment.reject_reason.unwrap().to_string(),
            "Daily loss budget exhausted"
        );
    }
}
