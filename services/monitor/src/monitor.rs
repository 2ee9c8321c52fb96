//! Chain event monitor: subscribes to new blocks and pending transactions,
//! deduplicates by hash, classifies via the decoder registry, and publishes
//! typed events.
//!
//! Per-hash lifecycle: Unseen → Seen (deduped) → Classified → Emitted →
//! Evicted. Caches are bounded: the pending cache is swept by age and hard
//! size cap (oldest first), and the dedup set is cleared wholesale above
//! its ceiling, trading precision for bounded memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Block, BlockNumber, Transaction, TxHash, H256};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use config::MonitorConfig;
use types::{
    BlockSummary, ChainEvent, EventSource, EventTopic, GasUpdate, ObservedTx, ReorgNotice,
};

use crate::classifier::DecoderRegistry;
use crate::error::{MonitorError, Result};
use crate::events::EventBus;
use crate::provider::ProviderPool;

/// Backoff between WebSocket session attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Tip {
    hash: H256,
    number: u64,
}

#[derive(Default)]
struct MonitorStats {
    pending_seen: AtomicU64,
    duplicates_dropped: AtomicU64,
    not_found_dropped: AtomicU64,
    fetch_errors: AtomicU64,
    uninteresting_dropped: AtomicU64,
    emitted: AtomicU64,
    blocks_processed: AtomicU64,
    reorgs_detected: AtomicU64,
}

/// Point-in-time monitor counters for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatsSnapshot {
    pub pending_seen: u64,
    pub duplicates_dropped: u64,
    pub not_found_dropped: u64,
    pub fetch_errors: u64,
    pub uninteresting_dropped: u64,
    pub emitted: u64,
    pub blocks_processed: u64,
    pub reorgs_detected: u64,
    pub avg_block_time_secs: f64,
    pub pending_cache_size: usize,
    pub dedup_set_size: usize,
}

/// The monitor owns its caches exclusively; nothing else writes them.
pub struct ChainEventMonitor {
    pool: Arc<ProviderPool>,
    registry: DecoderRegistry,
    bus: EventBus,
    config: MonitorConfig,
    /// Dedup set over every hash ever observed in the current window.
    seen: DashSet<TxHash>,
    /// Pending transactions by first-observation time.
    pending: DashMap<TxHash, Instant>,
    /// Last tip observed by the reorg scan.
    tip: Mutex<Option<Tip>>,
    /// Recent block-interval samples (seconds) and the last block timestamp.
    block_times: Mutex<(VecDeque<f64>, Option<u64>)>,
    stats: MonitorStats,
}

impl ChainEventMonitor {
    pub fn new(pool: Arc<ProviderPool>, registry: DecoderRegistry, config: MonitorConfig) -> Self {
        let bus = EventBus::new(config.topic_capacity);
        Self {
            pool,
            registry,
            bus,
            config,
            seen: DashSet::new(),
            pending: DashMap::new(),
            tip: Mutex::new(None),
            block_times: Mutex::new((VecDeque::new(), None)),
            stats: MonitorStats::default(),
        }
    }

    /// Subscribe to one event topic.
    pub fn subscribe(&self, topic: EventTopic) -> broadcast::Receiver<ChainEvent> {
        self.bus.subscribe(topic)
    }

    /// Process one pending-transaction notification.
    ///
    /// Duplicates drop silently. "Not found" on fetch drops silently too:
    /// the transaction may have been dropped or replaced before we asked.
    pub async fn handle_pending_hash(&self, hash: TxHash) {
        self.stats.pending_seen.fetch_add(1, Ordering::Relaxed);

        if !self.seen.insert(hash) {
            self.stats.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let tx = match self.pool.transaction(hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                self.stats.not_found_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%hash, "pending tx not found, dropped or replaced");
                return;
            }
            Err(e) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                debug!(%hash, error = %e, "pending tx fetch failed, dropping");
                return;
            }
        };

        self.pending.insert(hash, Instant::now());
        self.process_transaction(tx, EventSource::Mempool);
    }

    /// Process a new block: rolling block-time update, classify/emit every
    /// contained transaction, then a block summary and a gas update.
    pub fn handle_block(&self, block: Block<Transaction>) {
        let number = block.number.map(|n| n.as_u64()).unwrap_or_default();
        let hash = block.hash.unwrap_or_default();
        let avg_block_time = self.record_block_time(block.timestamp.as_u64());

        let mut tx_count = 0usize;
        for tx in block.transactions {
            tx_count += 1;
            if !self.seen.insert(tx.hash) {
                self.stats.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.process_transaction(tx, EventSource::Block);
        }

        if let Some(base_fee) = block.base_fee_per_gas {
            self.bus.publish(
                EventTopic::GasUpdate,
                ChainEvent::GasUpdate(GasUpdate {
                    block_number: number,
                    base_fee_wei: base_fee,
                }),
            );
        }

        self.bus.publish(
            EventTopic::Block,
            ChainEvent::Block(BlockSummary {
                number,
                hash,
                parent_hash: block.parent_hash,
                timestamp: block.timestamp.as_u64(),
                tx_count,
                base_fee_per_gas: block.base_fee_per_gas,
                avg_block_time_secs: avg_block_time,
            }),
        );

        self.stats.blocks_processed.fetch_add(1, Ordering::Relaxed);
        debug!(number, tx_count, avg_block_time, "block processed");
    }

    fn process_transaction(&self, tx: Transaction, source: EventSource) {
        let classes = self.registry.classify(&tx);
        if classes.is_empty() {
            self.stats
                .uninteresting_dropped
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let observed = ObservedTx {
            hash: tx.hash,
            tx,
            classes,
            source,
            observed_at: Instant::now(),
        };
        self.bus
            .publish_transaction(ChainEvent::Transaction(observed));
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_block_time(&self, timestamp: u64) -> f64 {
        let mut guard = self.block_times.lock();
        let (window, last) = &mut *guard;
        if let Some(prev) = *last {
            if timestamp > prev {
                if window.len() == self.config.block_time_window.max(1) {
                    window.pop_front();
                }
                window.push_back((timestamp - prev) as f64);
            }
        }
        *last = Some(timestamp);
        if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f64>() / window.len() as f64
        }
    }

    /// Reorg scan: compare the latest block's parent hash against the
    /// previously observed tip. On mismatch, emit `reorg` and invalidate
    /// every cache rather than attempting to diff the affected range.
    pub async fn check_reorg(&self) -> Result<()> {
        let block = self
            .pool
            .block_with_txs(BlockNumber::Latest.into())
            .await?
            .ok_or_else(|| MonitorError::Undecodable("latest block unavailable".to_string()))?;

        let hash = block.hash.unwrap_or_default();
        let number = block.number.map(|n| n.as_u64()).unwrap_or_default();

        let previous = {
            let mut tip = self.tip.lock();
            let previous = *tip;
            *tip = Some(Tip { hash, number });
            previous
        };

        if let Some(prev) = previous {
            if hash != prev.hash && block.parent_hash != prev.hash {
                self.stats.reorgs_detected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    previous_tip = %prev.hash,
                    new_tip = %hash,
                    number,
                    "chain tip no longer extends observed tip, invalidating caches"
                );
                self.invalidate_caches();
                self.bus.publish(
                    EventTopic::Reorg,
                    ChainEvent::Reorg(ReorgNotice {
                        previous_tip: prev.hash,
                        new_tip: hash,
                        new_tip_number: number,
                    }),
                );
            }
        }
        Ok(())
    }

    /// Drop everything observed so far. Called on reorg.
    pub fn invalidate_caches(&self) {
        self.seen.clear();
        self.pending.clear();
    }

    /// Periodic cache maintenance: TTL eviction, hard size cap (oldest
    /// first), wholesale dedup clear above the ceiling.
    pub fn sweep(&self) {
        let ttl = Duration::from_secs(self.config.pending_ttl_secs);
        self.pending.retain(|_, observed| observed.elapsed() < ttl);

        let over = self.pending.len().saturating_sub(self.config.pending_cache_max);
        if over > 0 {
            let mut entries: Vec<(TxHash, Instant)> = self
                .pending
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect();
            entries.sort_by_key(|(_, t)| *t);
            for (hash, _) in entries.into_iter().take(over) {
                self.pending.remove(&hash);
            }
        }

        if self.seen.len() > self.config.dedup_max {
            debug!(size = self.seen.len(), "dedup set over ceiling, clearing");
            self.seen.clear();
        }
    }

    pub fn stats_snapshot(&self) -> MonitorStatsSnapshot {
        let avg = {
            let guard = self.block_times.lock();
            let window = &guard.0;
            if window.is_empty() {
                0.0
            } else {
                window.iter().sum::<f64>() / window.len() as f64
            }
        };
        MonitorStatsSnapshot {
            pending_seen: self.stats.pending_seen.load(Ordering::Relaxed),
            duplicates_dropped: self.stats.duplicates_dropped.load(Ordering::Relaxed),
            not_found_dropped: self.stats.not_found_dropped.load(Ordering::Relaxed),
            fetch_errors: self.stats.fetch_errors.load(Ordering::Relaxed),
            uninteresting_dropped: self.stats.uninteresting_dropped.load(Ordering::Relaxed),
            emitted: self.stats.emitted.load(Ordering::Relaxed),
            blocks_processed: self.stats.blocks_processed.load(Ordering::Relaxed),
            reorgs_detected: self.stats.reorgs_detected.load(Ordering::Relaxed),
            avg_block_time_secs: avg,
            pending_cache_size: self.pending.len(),
            dedup_set_size: self.seen.len(),
        }
    }

    /// Run ingestion until shutdown: WebSocket subscriptions plus the
    /// periodic reorg scan, cache sweep and provider health check.
    /// Reconnects with backoff on subscription loss.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            let ws_url = self.pool.subscription_url()?;
            match self.run_session(&ws_url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "monitor session ended, reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn run_session(&self, ws_url: &str) -> Result<()> {
        let ws = Provider::<Ws>::connect(ws_url)
            .await
            .map_err(|e| MonitorError::Subscription(format!("connect {ws_url}: {e}")))?;
        info!(ws_url, "monitor connected");

        let mut pending = ws
            .subscribe_pending_txs()
            .await
            .map_err(|e| MonitorError::Subscription(format!("pendingTransactions: {e}")))?;
        let mut blocks = ws
            .subscribe_blocks()
            .await
            .map_err(|e| MonitorError::Subscription(format!("newHeads: {e}")))?;

        let mut reorg_tick =
            tokio::time::interval(Duration::from_secs(self.config.reorg_check_secs.max(1)));
        let mut sweep_tick =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
        let mut health_tick =
            tokio::time::interval(Duration::from_secs(self.config.health_check_secs.max(1)));

        loop {
            tokio::select! {
                hash = pending.next() => match hash {
                    Some(hash) => self.handle_pending_hash(hash).await,
                    None => return Err(MonitorError::Subscription(
                        "pending transaction stream closed".to_string(),
                    )),
                },
                header = blocks.next() => match header {
                    Some(header) => {
                        let Some(hash) = header.hash else { continue };
                        match self.pool.block_with_txs(hash.into()).await {
                            Ok(Some(block)) => self.handle_block(block),
                            Ok(None) => debug!(%hash, "announced block not found"),
                            Err(e) => debug!(%hash, error = %e, "block fetch failed"),
                        }
                    }
                    None => return Err(MonitorError::Subscription(
                        "block stream closed".to_string(),
                    )),
                },
                _ = reorg_tick.tick() => {
                    if let Err(e) = self.check_reorg().await {
                        debug!(error = %e, "reorg scan failed");
                    }
                },
                _ = sweep_tick.tick() => self.sweep(),
                _ = health_tick.tick() => {
                    self.pool.run_health_check(self.config.max_block_lag).await;
                },
            }
        }
    }
}
