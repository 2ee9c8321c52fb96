//! Classified chain events emitted by the monitor.
//!
//! A raw pending transaction or block becomes a [`ChainEvent`] once it has
//! passed dedup and classification. Strategies subscribe to [`EventTopic`]s
//! and receive the typed payloads below.

use std::time::Instant;

use ethers::types::{Transaction, TxHash, H256, U256};

/// Where an observed transaction was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Seen as a pending transaction in the mempool.
    Mempool,
    /// Seen inside a mined block.
    Block,
}

/// Classification assigned by the decoder registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxClass {
    /// Swap against a monitored router or pool.
    Swap,
    /// Liquidation call against a monitored lending protocol.
    Liquidation,
    /// Flash-loan initiation.
    FlashLoan,
    /// Plain value transfer at or above the high-value threshold.
    HighValue,
    /// Interesting but unclassified (non-empty calldata to a watched address).
    Generic,
}

impl TxClass {
    /// Topic a classified transaction is additionally published on.
    pub fn topic(&self) -> EventTopic {
        match self {
            TxClass::Swap => EventTopic::Swap,
            TxClass::Liquidation => EventTopic::Liquidation,
            TxClass::FlashLoan => EventTopic::FlashLoan,
            TxClass::HighValue => EventTopic::HighValue,
            TxClass::Generic => EventTopic::Transaction,
        }
    }
}

/// Event topics strategies can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Block,
    Transaction,
    Swap,
    Liquidation,
    FlashLoan,
    HighValue,
    GasUpdate,
    Reorg,
}

/// A fully-fetched transaction that survived dedup and classification.
///
/// A single transaction can satisfy several classifications at once (a
/// swap moving 12 ETH is both `Swap` and `HighValue`); it is published on
/// the firehose topic plus the topic of every class it carries.
#[derive(Debug, Clone)]
pub struct ObservedTx {
    pub hash: TxHash,
    pub tx: Transaction,
    pub classes: Vec<TxClass>,
    pub source: EventSource,
    pub observed_at: Instant,
}

impl ObservedTx {
    /// The leading classification, used where a single kind is reported.
    pub fn primary_class(&self) -> TxClass {
        self.classes.first().copied().unwrap_or(TxClass::Generic)
    }
}

/// Summary emitted once per processed block.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
    pub timestamp: u64,
    pub tx_count: usize,
    pub base_fee_per_gas: Option<U256>,
    /// Rolling average block time maintained by the monitor, in seconds.
    pub avg_block_time_secs: f64,
}

/// Gas price update derived from a new block header.
#[derive(Debug, Clone, Copy)]
pub struct GasUpdate {
    pub block_number: u64,
    pub base_fee_wei: U256,
}

/// Notice that the observed chain tip no longer extends the previous one.
#[derive(Debug, Clone, Copy)]
pub struct ReorgNotice {
    pub previous_tip: H256,
    pub new_tip: H256,
    pub new_tip_number: u64,
}

/// Union of everything the monitor publishes.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    Block(BlockSummary),
    Transaction(ObservedTx),
    GasUpdate(GasUpdate),
    Reorg(ReorgNotice),
}

impl ChainEvent {
    /// Primary topic this event is published on.
    pub fn topic(&self) -> EventTopic {
        match self {
            ChainEvent::Block(_) => EventTopic::Block,
            ChainEvent::Transaction(_) => EventTopic::Transaction,
            ChainEvent::GasUpdate(_) => EventTopic::GasUpdate,
            ChainEvent::Reorg(_) => EventTopic::Reorg,
        }
    }

    /// Dedup identity where one exists (transactions and blocks).
    pub fn hash(&self) -> Option<H256> {
        match self {
            ChainEvent::Block(b) => Some(b.hash),
            ChainEvent::Transaction(t) => Some(t.hash),
            ChainEvent::GasUpdate(_) | ChainEvent::Reorg(_) => None,
        }
    }
}
