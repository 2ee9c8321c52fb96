//! # Searcher
//!
//! Pipeline wiring for the Sentinel process: strategy registration and
//! fan-in, admission gating, bounded concurrent execution, outcome
//! feedback, and the aggregated status surface. The binary in `main.rs`
//! is a thin shell over [`PipelineEngine`].

pub mod engine;
pub mod sink;
pub mod strategy;

pub use engine::{PipelineEngine, StatusReport};
pub use sink::{DecisionSink, TracingSink};
pub use strategy::{HighValueWatcher, Strategy};
