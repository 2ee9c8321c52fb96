//! The ordered, independent admission check set.
//!
//! Each check returns `{passed, value, threshold, weight}`; the composite
//! score is the weight-normalised sum of penalties. Checks never consult
//! each other, so introducing an additional failure can only raise the
//! composite score.

use rust_decimal::prelude::ToPrimitive;

use config::RiskLimitsConfig;
use types::{wei_to_eth, CheckDirection, Opportunity, RiskCheck};

/// Chain state sampled once per admission.
#[derive(Debug, Clone, Copy)]
pub struct CheckInputs {
    pub gas_price_gwei: f64,
    pub daily_loss_eth: f64,
}

/// Run every check against one opportunity. Order is fixed; results are
/// independent.
pub fn run_checks(
    config: &RiskLimitsConfig,
    opp: &Opportunity,
    inputs: CheckInputs,
) -> Vec<RiskCheck> {
    let trade_eth = wei_to_eth(opp.required_amount_wei);
    let profit_eth = wei_to_eth(opp.expected_profit_wei);
    let gas_cost_eth = opp.gas_estimate as f64 * inputs.gas_price_gwei * 1e-9;

    let mut checks = Vec::with_capacity(8);

    checks.push(RiskCheck {
        name: "daily_loss_budget",
        passed: inputs.daily_loss_eth < config.max_daily_loss_eth,
        value: inputs.daily_loss_eth,
        threshold: config.max_daily_loss_eth,
        direction: CheckDirection::AtMost,
        weight: 2.0,
    });

    checks.push(RiskCheck {
        name: "position_size",
        passed: trade_eth <= config.max_position_eth,
        value: trade_eth,
        threshold: config.max_position_eth,
        direction: CheckDirection::AtMost,
        weight: 1.5,
    });

    checks.push(RiskCheck {
        name: "gas_price",
        passed: inputs.gas_price_gwei <= config.gas_ceiling_gwei as f64,
        value: inputs.gas_price_gwei,
        threshold: config.gas_ceiling_gwei as f64,
        direction: CheckDirection::AtMost,
        weight: 1.5,
    });

    let min_ratio = config.min_profit_gas_ratio.to_f64().unwrap_or(2.0);
    let ratio = if gas_cost_eth > 0.0 {
        profit_eth / gas_cost_eth
    } else {
        0.0
    };
    checks.push(RiskCheck {
        name: "profit_gas_ratio",
        passed: ratio >= min_ratio,
        value: ratio,
        threshold: min_ratio,
        direction: CheckDirection::AtLeast,
        weight: 1.5,
    });

    let max_token_risk = opp
        .market
        .token_risk_scores
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    checks.push(RiskCheck {
        name: "token_risk",
        passed: max_token_risk <= config.max_token_risk,
        value: max_token_risk,
        threshold: config.max_token_risk,
        direction: CheckDirection::AtMost,
        weight: 1.0,
    });

    let max_venue_risk = opp
        .market
        .venue_risk_scores
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    checks.push(RiskCheck {
        name: "venue_risk",
        passed: max_venue_risk <= config.max_venue_risk,
        value: max_venue_risk,
        threshold: config.max_venue_risk,
        direction: CheckDirection::AtMost,
        weight: 1.0,
    });

    checks.push(RiskCheck {
        name: "slippage",
        passed: opp.market.expected_slippage_pct <= config.max_slippage_pct,
        value: opp.market.expected_slippage_pct,
        threshold: config.max_slippage_pct,
        direction: CheckDirection::AtMost,
        weight: 1.0,
    });

    let liquidity_eth = wei_to_eth(opp.market.available_liquidity_wei);
    let required_liquidity = config.liquidity_multiple * trade_eth;
    checks.push(RiskCheck {
        name: "liquidity",
        passed: liquidity_eth >= required_liquidity,
        value: liquidity_eth,
        threshold: required_liquidity,
        direction: CheckDirection::AtLeast,
        weight: 1.0,
    });

    checks
}

/// Weight-normalised composite in [0, 10].
pub fn composite_score(checks: &[RiskCheck]) -> f64 {
    let total_weight: f64 = checks.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = checks.iter().map(|c| c.weight * c.penalty()).sum();
    (weighted / total_weight).clamp(0.0, 10.0)
}

/// Human-readable detail for the first failed check, used as the rejection
/// reason string.
pub fn failure_detail(check: &RiskCheck) -> String {
    match check.name {
        "daily_loss_budget" => "Daily loss budget exhausted".to_string(),
        "position_size" => "Position exceeds size cap".to_string(),
        "gas_price" => "Gas price too high".to_string(),
        "profit_gas_ratio" => "Profit/gas ratio below minimum".to_string(),
        "token_risk" => "Token risk score too high".to_string(),
        "venue_risk" => "Venue risk score too high".to_string(),
        "slippage" => "Estimated slippage above cap".to_string(),
        "liquidity" => "Insufficient venue liquidity".to_string(),
        other => format!("Check failed: {other}"),
    }
}
