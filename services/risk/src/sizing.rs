//! Position sizing for approved opportunities.
//!
//! The adjustment order is fixed: base → confidence → profit-ratio →
//! risk-score decay → strategy multiplier → fractional Kelly → bounds
//! clamp. Kelly only activates once enough trade history has accumulated.

use tracing::debug;

use config::RiskLimitsConfig;
use types::{wei_to_eth, Opportunity};

use crate::history::KellyInputs;

/// Computes a bounded position size from balance, opportunity shape,
/// composite risk score and trade history.
pub struct PositionSizer {
    config: RiskLimitsConfig,
}

impl PositionSizer {
    pub fn new(config: RiskLimitsConfig) -> Self {
        Self { config }
    }

    /// Position size in ETH. Always within
    /// `[min_position, min(max_position, balance_cap_pct × balance)]`.
    pub fn size(
        &self,
        balance_eth: f64,
        opp: &Opportunity,
        composite_score: f64,
        kelly: KellyInputs,
    ) -> f64 {
        let mut size = balance_eth * self.config.base_position_pct;

        // Confidence maps [0, 1] onto a [0.5, 2.0] multiplier.
        let confidence = opp.confidence.clamp(0.0, 1.0);
        size *= 0.5 + confidence * 1.5;

        // Profit ratio nudges the size by at most ±20%: a 2% expected
        // return earns the full bonus, zero return takes the full cut.
        let trade_eth = wei_to_eth(opp.required_amount_wei);
        let profit_ratio = if trade_eth > 0.0 {
            wei_to_eth(opp.expected_profit_wei) / trade_eth
        } else {
            0.0
        };
        size *= 0.8 + (profit_ratio / 0.02).clamp(0.0, 1.0) * 0.4;

        // Exponential decay against the composite risk score.
        size *= (-composite_score / 5.0).exp();

        size *= strategy_multiplier(opp.kind.label());

        if kelly.trades >= self.config.kelly.min_trades {
            let f = kelly_fraction(kelly);
            size *= self.config.kelly.fraction * f;
            debug!(trades = kelly.trades, kelly_f = f, "kelly scaling active");
        }

        let upper = self
            .config
            .max_position_eth
            .min(self.config.balance_cap_pct * balance_eth);
        let lower = self.config.min_position_eth.min(upper);
        size.clamp(lower, upper.max(0.0))
    }
}

/// Per-kind sizing multiplier.
fn strategy_multiplier(kind: &str) -> f64 {
    match kind {
        "arbitrage" => 1.0,
        "flashloan" => 1.2,
        "liquidation" => 0.8,
        "sandwich" => 0.5,
        _ => 1.0,
    }
}

/// Full Kelly fraction `f = (p·b − q)/b`, floored at zero. With no
/// recorded losses `b` is unbounded and `f` degenerates to the win rate.
fn kelly_fraction(inputs: KellyInputs) -> f64 {
    let p = inputs.win_rate.clamp(0.0, 1.0);
    let q = 1.0 - p;
    if inputs.avg_loss_eth <= f64::EPSILON {
        return p;
    }
    let b = inputs.avg_win_eth / inputs.avg_loss_eth;
    if b <= f64::EPSILON {
        return 0.0;
    }
    ((p * b - q) / b).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use types::{eth_to_wei, MarketContext, OpportunityKind, SwapLeg};

    fn opportunity(kind: OpportunityKind, confidence: f64) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            strategy: "test".to_string(),
            kind,
            expected_profit_wei: eth_to_wei(0.02),
            required_amount_wei: eth_to_wei(1.0),
            gas_estimate: 300_000,
            confidence,
            priority: 100,
            created_at: now,
            expires_at: now + Duration::seconds(5),
            market: MarketContext::default(),
        }
    }

    fn arbitrage(confidence: f64) -> Opportunity {
        opportunity(
            OpportunityKind::Arbitrage {
                path: vec![SwapLeg {
                    venue: "univ2".to_string(),
                    pool: Default::default(),
                    token_in: Default::default(),
                    token_out: Default::default(),
                }],
            },
            confidence,
        )
    }

    fn no_history() -> KellyInputs {
        KellyInputs {
            trades: 0,
            win_rate: 0.0,
            avg_win_eth: 0.0,
            avg_loss_eth: 0.0,
        }
    }

    #[test]
    fn size_respects_bounds_for_extreme_scores() {
        let sizer = PositionSizer::new(RiskLimitsConfig::default());
        let balance = 10.0;
        for score in [0.0, 3.0, 7.0, 10.0] {
            let size = sizer.size(balance, &arbitrage(0.9), score, no_history());
            let upper = 5.0_f64.min(0.9 * balance);
            assert!(size >= 0.05 && size <= upper, "size {size} out of bounds");
        }
    }

    #[test]
    fn higher_risk_score_shrinks_position() {
        let sizer = PositionSizer::new(RiskLimitsConfig::default());
        let low = sizer.size(100.0, &arbitrage(0.9), 1.0, no_history());
        let high = sizer.size(100.0, &arbitrage(0.9), 8.0, no_history());
        assert!(high < low);
    }

    #[test]
    fn sandwich_is_cut_relative_to_arbitrage() {
        // Small balance keeps both sizes inside the clamp band so the
        // multiplier ratio is observable.
        let sizer = PositionSizer::new(RiskLimitsConfig::default());
        let arb = sizer.size(10.0, &arbitrage(0.9), 2.0, no_history());
        let sandwich_opp = opportunity(
            OpportunityKind::Sandwich {
                victim_tx: Default::default(),
                router: Default::default(),
                token_in: Default::default(),
                token_out: Default::default(),
                front_amount_wei: eth_to_wei(1.0),
            },
            0.9,
        );
        let sandwich = sizer.size(10.0, &sandwich_opp, 2.0, no_history());
        assert!((sandwich / arb - 0.5).abs() < 1e-9);
    }

    #[test]
    fn kelly_activates_only_with_enough_trades() {
        let sizer = PositionSizer::new(RiskLimitsConfig::default());
        let winning = KellyInputs {
            trades: 19,
            win_rate: 0.7,
            avg_win_eth: 0.1,
            avg_loss_eth: 0.05,
        };
        let before = sizer.size(100.0, &arbitrage(0.9), 2.0, winning);
        let after = sizer.size(
            100.0,
            &arbitrage(0.9),
            2.0,
            KellyInputs {
                trades: 20,
                ..winning
            },
        );
        // Fractional Kelly is a strict down-scaling here.
        assert!(after < before);
    }

    #[test]
    fn losing_history_floors_at_minimum_position() {
        let sizer = PositionSizer::new(RiskLimitsConfig::default());
        let losing = KellyInputs {
            trades: 50,
            win_rate: 0.2,
            avg_win_eth: 0.01,
            avg_loss_eth: 0.1,
        };
        // Kelly fraction is zero; the clamp floors at min_position.
        let size = sizer.size(100.0, &arbitrage(0.9), 2.0, losing);
        assert!((size - 0.05).abs() < 1e-9);
    }

    #[test]
    fn kelly_fraction_math() {
        // p=0.6, q=0.4, b=2 → f = (1.2-0.4)/2 = 0.4
        let f = kelly_fraction(KellyInputs {
            trades: 30,
            win_rate: 0.6,
            avg_win_eth: 0.2,
            avg_loss_eth: 0.1,
        });
        assert!((f - 0.4).abs() < 1e-9);

        // No losses recorded: degenerate to win rate.
        let all_wins = kelly_fraction(KellyInputs {
            trades: 30,
            win_rate: 1.0,
            avg_win_eth: 0.2,
            avg_loss_eth: 0.0,
        });
        assert!((all_wins - 1.0).abs() < 1e-9);
    }
}
