//! # Risk & Admission Control
//!
//! The gate between opportunity detection and execution. Every opportunity
//! runs through an ordered set of independent weighted checks; approval
//! requires zero failures and a composite score below the configured
//! ceiling, and grants a bounded position size. A three-state circuit
//! breaker blocks all admissions after excessive failures, with independent
//! per-strategy disabling.
//!
//! Nothing is ever silently dropped here: every rejection carries a
//! machine-readable reason and is logged.

pub mod admission;
pub mod breaker;
pub mod checks;
pub mod history;
pub mod sizing;

pub use admission::{AdmissionContext, AdmissionController};
pub use breaker::{BreakerStatus, CircuitBreaker, CircuitState, Permit};
pub use history::{DailyLedger, TradeHistory};
pub use sizing::PositionSizer;
