//! Provider health snapshots exposed by the status query surface.
//!
//! The live bookkeeping (rolling latency window, atomic counters) is owned
//! by the provider pool; this is the read-only view it publishes.

use serde::Serialize;

/// Point-in-time view of one RPC endpoint's reliability.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    pub name: String,
    pub requests: u64,
    pub errors: u64,
    /// Errors divided by requests; 0.0 until the first request.
    pub error_rate: f64,
    /// Mean over the rolling latency window, milliseconds.
    pub avg_latency_ms: f64,
    /// Configured priority, lower is preferred.
    pub priority: u32,
    pub healthy: bool,
}

impl ProviderHealthSnapshot {
    /// Selection score: latency plus an error-rate penalty weighted 1000×
    /// plus a priority penalty weighted 10×. Lower is better; the pool
    /// ranks healthy providers ascending and `best()` takes the head.
    pub fn score(&self) -> f64 {
        self.avg_latency_ms + self.error_rate * 1000.0 + self.priority as f64 * 10.0
    }
}
