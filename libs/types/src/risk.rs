//! Admission-control results: individual checks, the composite assessment,
//! and the decision records handed to the persistence sink.

use std::fmt;

use ethers::types::U256;
use serde::Serialize;

/// Whether a check passes below or above its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckDirection {
    /// Passes while `value <= threshold` (gas price, slippage, risk caps).
    AtMost,
    /// Passes while `value >= threshold` (profit ratio, liquidity).
    AtLeast,
}

/// Result of one independent risk check.
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheck {
    pub name: &'static str,
    pub passed: bool,
    /// Observed value, in the check's own unit.
    pub value: f64,
    /// Threshold the value was compared against.
    pub threshold: f64,
    pub direction: CheckDirection,
    /// Relative weight in the composite score.
    pub weight: f64,
}

impl RiskCheck {
    /// Penalty this check contributes to the composite score: a failed
    /// check contributes the full 10, a passed check contributes its
    /// utilisation of the threshold scaled to at most 5.
    pub fn penalty(&self) -> f64 {
        if !self.passed {
            return 10.0;
        }
        let utilisation = match self.direction {
            CheckDirection::AtMost => {
                if self.threshold.abs() < f64::EPSILON {
                    0.0
                } else {
                    self.value / self.threshold
                }
            }
            CheckDirection::AtLeast => {
                if self.value.abs() < f64::EPSILON {
                    1.0
                } else {
                    self.threshold / self.value
                }
            }
        };
        utilisation.clamp(0.0, 1.0) * 5.0
    }
}

/// Machine-readable rejection reason. `Display` renders the wire string
/// reported to the sink and logs.
#[derive(Debug, Clone, Serialize)]
pub enum RejectReason {
    /// `expires_at` had passed at the moment of the admission check.
    Expired,
    /// The global circuit breaker is open.
    CircuitOpen,
    /// This strategy was disabled after crossing its failure threshold.
    StrategyDisabled { strategy: String },
    /// One or more checks failed; `detail` is the first failure's message.
    CheckFailed { name: &'static str, detail: String },
    /// All checks passed but the composite score reached the ceiling.
    ScoreTooHigh { score: f64, ceiling: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Expired => write!(f, "expired"),
            RejectReason::CircuitOpen => write!(f, "circuit-open"),
            RejectReason::StrategyDisabled { strategy } => {
                write!(f, "strategy-disabled: {strategy}")
            }
            RejectReason::CheckFailed { detail, .. } => write!(f, "{detail}"),
            RejectReason::ScoreTooHigh { score, ceiling } => {
                write!(f, "risk score {score:.1} above ceiling {ceiling:.1}")
            }
        }
    }
}

/// Outcome of admission checks for one opportunity. Computed once, never
/// persisted beyond the decision.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub approved: bool,
    /// Weighted aggregate of check penalties, normalised to [0, 10].
    pub composite_score: f64,
    pub checks: Vec<RiskCheck>,
    /// Position size granted on approval, zero otherwise.
    pub position_size_wei: U256,
    pub reject_reason: Option<RejectReason>,
}

impl RiskAssessment {
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            approved: false,
            composite_score: 10.0,
            checks: Vec::new(),
            position_size_wei: U256::zero(),
            reject_reason: Some(reason),
        }
    }
}

/// Record emitted to the external persistence/metrics sink after each
/// admission decision. The sink is never consulted for correctness.
#[derive(Debug, Clone)]
pub enum Decision {
    Admitted {
        opportunity_id: u64,
        strategy: String,
        composite_score: f64,
        position_size_wei: U256,
    },
    Rejected {
        opportunity_id: u64,
        strategy: String,
        reason: RejectReason,
    },
}
