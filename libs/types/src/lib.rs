//! # Sentinel Shared Types Library
//!
//! Unified type definitions shared by every Sentinel service: classified
//! chain events, the opportunity tagged union, risk assessments, execution
//! plans and outcomes, and provider health snapshots.
//!
//! ## Design Philosophy
//!
//! - **One vocabulary**: the monitor, risk engine and execution engine all
//!   speak in these types; no service re-declares its own variant of an
//!   opportunity or an outcome.
//! - **Tagged unions over duck typing**: strategy-dependent payloads live in
//!   [`OpportunityKind`] and are pattern-matched explicitly at the execution
//!   boundary.
//! - **Exact amounts on the wire**: everything denominated on-chain is a
//!   `U256` in wei; floating point appears only in risk scoring and
//!   reporting, with explicit conversion points in [`units`].

pub mod chain;
pub mod execution;
pub mod opportunity;
pub mod provider;
pub mod risk;
pub mod units;

pub use chain::{
    BlockSummary, ChainEvent, EventSource, EventTopic, GasUpdate, ObservedTx, ReorgNotice, TxClass,
};
pub use execution::{
    DispatchMode, ExecutionOutcome, ExecutionPlan, FailureKind, PlannedTx,
};
pub use opportunity::{MarketContext, Opportunity, OpportunityKind, SwapLeg};
pub use provider::ProviderHealthSnapshot;
pub use risk::{CheckDirection, Decision, RejectReason, RiskAssessment, RiskCheck};
pub use units::{eth_to_wei, gwei_to_wei, wei_to_eth, wei_to_gwei};
