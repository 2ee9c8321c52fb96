//! Property-based checks for the risk model: score monotonicity under
//! added failures, and position sizing bounds over arbitrary inputs.

use chrono::{Duration, Utc};
use proptest::prelude::*;

use config::RiskLimitsConfig;
use risk::history::KellyInputs;
use risk::PositionSizer;
use types::{
    eth_to_wei, wei_to_eth, CheckDirection, MarketContext, Opportunity, OpportunityKind, RiskCheck,
};

fn composite(checks: &[RiskCheck]) -> f64 {
    let total: f64 = checks.iter().map(|c| c.weight).sum();
    checks.iter().map(|c| c.weight * c.penalty()).sum::<f64>() / total
}

fn check(name: &'static str, passed: bool, value: f64, threshold: f64, weight: f64) -> RiskCheck {
    RiskCheck {
        name,
        passed,
        value,
        threshold,
        direction: CheckDirection::AtMost,
        weight,
    }
}

fn opportunity(profit_eth: f64, amount_eth: f64, confidence: f64) -> Opportunity {
    let now = Utc::now();
    Opportunity {
        id: 1,
        strategy: "prop".to_string(),
        kind: OpportunityKind::Arbitrage { path: Vec::new() },
        expected_profit_wei: eth_to_wei(profit_eth),
        required_amount_wei: eth_to_wei(amount_eth),
        gas_estimate: 300_000,
        confidence,
        priority: 100,
        created_at: now,
        expires_at: now + Duration::seconds(5),
        market: MarketContext::default(),
    }
}

proptest! {
    /// Flipping any single passed check to failed never lowers the
    /// composite score.
    #[test]
    fn failing_a_check_never_lowers_score(
        values in prop::collection::vec(0.0_f64..1.0, 3..8),
        flip in 0usize..8,
    ) {
        let checks: Vec<RiskCheck> = values
            .iter()
            .enumerate()
            .map(|(i, v)| check("c", true, *v, 1.0, 1.0 + i as f64 * 0.5))
            .collect();
        let flip = flip % checks.len();

        let baseline = composite(&checks);

        let mut failed = checks.clone();
        failed[flip].passed = false;
        let with_failure = composite(&failed);

        prop_assert!(with_failure >= baseline - 1e-12);
    }

    /// Position size stays inside
    /// [min_position, min(max_position, 0.9 × balance)] for any risk score
    /// and opportunity shape, whenever that interval is non-empty.
    #[test]
    fn position_size_is_always_bounded(
        balance in 0.1_f64..10_000.0,
        score in 0.0_f64..10.0,
        confidence in 0.0_f64..1.0,
        profit in 0.0_f64..1.0,
        amount in 0.01_f64..100.0,
        trades in 0usize..100,
        win_rate in 0.0_f64..1.0,
    ) {
        let config = RiskLimitsConfig::default();
        let sizer = PositionSizer::new(config.clone());

        let kelly = KellyInputs {
            trades,
            win_rate,
            avg_win_eth: 0.1,
            avg_loss_eth: 0.05,
        };

        let size = sizer.size(balance, &opportunity(profit, amount, confidence), score, kelly);

        let upper = config.max_position_eth.min(config.balance_cap_pct * balance);
        let lower = config.min_position_eth.min(upper);
        prop_assert!(size >= lower - 1e-12, "size {} below lower bound {}", size, lower);
        prop_assert!(size <= upper + 1e-12, "size {} above upper bound {}", size, upper);
    }

    /// The composite score is always within [0, 10].
    #[test]
    fn composite_score_is_normalised(
        values in prop::collection::vec((0.0_f64..100.0, any::<bool>()), 1..8),
    ) {
        let checks: Vec<RiskCheck> = values
            .iter()
            .map(|(v, passed)| check("c", *passed, *v, 10.0, 1.0))
            .collect();
        let score = composite(&checks);
        prop_assert!((0.0..=10.0).contains(&score));
    }
}

/// Sized positions convert to wei and back without leaving the band.
#[test]
fn sized_position_survives_wei_round_trip() {
    let config = RiskLimitsConfig::default();
    let sizer = PositionSizer::new(config.clone());
    let kelly = KellyInputs {
        trades: 0,
        win_rate: 0.0,
        avg_win_eth: 0.0,
        avg_loss_eth: 0.0,
    };
    let size = sizer.size(10.0, &opportunity(0.02, 1.0, 0.8), 3.0, kelly);
    let round = wei_to_eth(eth_to_wei(size));
    assert!((round - size).abs() < 1e-9);
}
