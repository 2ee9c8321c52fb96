//! # Chain Monitor
//!
//! Ingestion front end of the Sentinel pipeline: a pool of redundant,
//! health-scored RPC providers and the event monitor that turns raw block
//! and mempool notifications into deduplicated, classified, typed events.
//!
//! ## Architecture Role
//!
//! ```text
//! RPC Providers → [Provider Pool] → [Chain Event Monitor] → Typed Topics
//!       ↓               ↓                   ↓                    ↓
//! newHeads /       health scoring     dedup by hash        block / swap /
//! pendingTxs       with_fallback      decoder registry     liquidation /
//! JSON-RPC         broadcast top-K    reorg detection      highValue / gas
//! ```
//!
//! Strategies never talk to a provider directly; everything downstream
//! consumes the broadcast topics published here.

pub mod classifier;
pub mod error;
pub mod events;
pub mod monitor;
pub mod provider;
pub mod rpc;

pub use classifier::DecoderRegistry;
pub use error::{MonitorError, Result};
pub use events::EventBus;
pub use monitor::{ChainEventMonitor, MonitorStatsSnapshot};
pub use provider::ProviderPool;
pub use rpc::{ChainRpc, EthersRpc};
