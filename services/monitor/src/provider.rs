//! Redundant RPC provider pool with health scoring and failover.
//!
//! Every call updates the owning endpoint's health record; records tolerate
//! concurrent writers (atomic counters, short mutex on the latency window).
//! A single provider failing is recovered by fallback; pool exhaustion
//! surfaces [`MonitorError::AllProvidersFailed`] and is retried in place by
//! callers, never treated as fatal to the process.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Block, BlockId, Bytes, Transaction, TransactionReceipt, TxHash, U256,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use config::ProviderEndpointConfig;
use types::ProviderHealthSnapshot;

use crate::error::{MonitorError, Result};
use crate::rpc::{ChainRpc, EthersRpc};

/// Rolling latency window size per endpoint.
const LATENCY_WINDOW: usize = 50;

/// Requests before the error-rate rule may mark an endpoint unhealthy.
const MIN_REQUESTS_FOR_HEALTH: u64 = 10;

/// Error rate above which an endpoint flips unhealthy.
const MAX_ERROR_RATE: f64 = 0.5;

/// Per-endpoint reliability record. Counters are monotonic; the latency
/// window rolls.
struct HealthRecord {
    requests: AtomicU64,
    errors: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
    /// Set by the periodic height check when this endpoint lags the primary.
    lagging: AtomicBool,
}

impl HealthRecord {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            lagging: AtomicBool::new(false),
        }
    }

    fn record(&self, latency: Duration, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut window = self.latencies_ms.lock();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency.as_secs_f64() * 1000.0);
    }

    fn error_rate(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.errors.load(Ordering::Relaxed) as f64 / requests as f64
    }

    fn healthy(&self) -> bool {
        if self.lagging.load(Ordering::Relaxed) {
            return false;
        }
        let requests = self.requests.load(Ordering::Relaxed);
        requests < MIN_REQUESTS_FOR_HEALTH || self.error_rate() <= MAX_ERROR_RATE
    }

    fn avg_latency_ms(&self) -> f64 {
        let window = self.latencies_ms.lock();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }
}

/// One endpoint of the pool.
pub struct ProviderEndpoint {
    name: String,
    priority: u32,
    ws_url: Option<String>,
    rpc: Arc<dyn ChainRpc>,
    health: HealthRecord,
}

impl ProviderEndpoint {
    fn snapshot(&self) -> ProviderHealthSnapshot {
        ProviderHealthSnapshot {
            name: self.name.clone(),
            requests: self.health.requests.load(Ordering::Relaxed),
            errors: self.health.errors.load(Ordering::Relaxed),
            error_rate: self.health.error_rate(),
            avg_latency_ms: self.health.avg_latency_ms(),
            priority: self.priority,
            healthy: self.health.healthy(),
        }
    }
}

/// Pool of redundant chain-RPC connections.
pub struct ProviderPool {
    endpoints: Vec<Arc<ProviderEndpoint>>,
}

impl ProviderPool {
    /// Build the pool from configuration, one HTTP client per endpoint.
    pub fn from_config(providers: &[ProviderEndpointConfig]) -> Result<Self> {
        if providers.is_empty() {
            return Err(MonitorError::NoUsableProvider(
                "no providers configured".to_string(),
            ));
        }
        let endpoints = providers
            .iter()
            .map(|p| {
                let rpc = EthersRpc::new(p.name.clone(), &p.http_url)?;
                Ok(Arc::new(ProviderEndpoint {
                    name: p.name.clone(),
                    priority: p.priority,
                    ws_url: p.ws_url.clone(),
                    rpc: Arc::new(rpc) as Arc<dyn ChainRpc>,
                    health: HealthRecord::new(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { endpoints })
    }

    /// Build a pool over caller-supplied RPC implementations (tests).
    pub fn from_rpcs(rpcs: Vec<(Arc<dyn ChainRpc>, u32)>) -> Self {
        let endpoints = rpcs
            .into_iter()
            .map(|(rpc, priority)| {
                Arc::new(ProviderEndpoint {
                    name: rpc.name().to_string(),
                    priority,
                    ws_url: None,
                    rpc,
                    health: HealthRecord::new(),
                })
            })
            .collect();
        Self { endpoints }
    }

    /// Endpoints sorted best-first: healthy before unhealthy, then by score.
    fn ranked(&self) -> Vec<Arc<ProviderEndpoint>> {
        let mut ranked: Vec<_> = self.endpoints.iter().cloned().collect();
        ranked.sort_by(|a, b| {
            let (ha, hb) = (a.health.healthy(), b.health.healthy());
            hb.cmp(&ha).then(
                a.snapshot()
                    .score()
                    .partial_cmp(&b.snapshot().score())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        ranked
    }

    /// The highest-ranked healthy provider.
    pub fn best(&self) -> Result<Arc<ProviderEndpoint>> {
        self.ranked()
            .into_iter()
            .find(|e| e.health.healthy())
            .ok_or_else(|| MonitorError::NoUsableProvider("no healthy provider".to_string()))
    }

    /// WebSocket URL of the best-ranked endpoint that has one.
    pub fn subscription_url(&self) -> Result<String> {
        self.ranked()
            .into_iter()
            .find_map(|e| e.ws_url.clone())
            .ok_or_else(|| {
                MonitorError::NoUsableProvider("no provider exposes a ws_url".to_string())
            })
    }

    /// Try `op` against providers in health-sorted order until one succeeds.
    /// All failing yields `AllProvidersFailed` wrapping the last error.
    pub async fn with_fallback<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn ChainRpc>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ranked = self.ranked();
        let attempts = ranked.len();
        let mut last_err: Option<MonitorError> = None;

        for endpoint in ranked {
            let started = Instant::now();
            match op(endpoint.rpc.clone()).await {
                Ok(value) => {
                    endpoint.health.record(started.elapsed(), true);
                    return Ok(value);
                }
                Err(e) => {
                    endpoint.health.record(started.elapsed(), false);
                    debug!(provider = %endpoint.name, error = %e, "provider call failed, falling back");
                    last_err = Some(e);
                }
            }
        }

        Err(MonitorError::AllProvidersFailed {
            attempts,
            last: Box::new(last_err.unwrap_or_else(|| {
                MonitorError::NoUsableProvider("empty provider pool".to_string())
            })),
        })
    }

    /// Send a signed transaction to the top-K providers in parallel and
    /// return the first success.
    pub async fn broadcast(&self, raw: Bytes, top_k: usize) -> Result<TxHash> {
        let targets: Vec<_> = self.ranked().into_iter().take(top_k.max(1)).collect();
        let attempts = targets.len();
        if targets.is_empty() {
            return Err(MonitorError::NoUsableProvider(
                "empty provider pool".to_string(),
            ));
        }

        let sends = targets.into_iter().map(|endpoint| {
            let raw = raw.clone();
            Box::pin(async move {
                let started = Instant::now();
                let result = endpoint.rpc.send_raw_transaction(raw).await;
                endpoint.health.record(started.elapsed(), result.is_ok());
                result
            })
        });

        match futures::future::select_ok(sends).await {
            Ok((hash, _rest)) => Ok(hash),
            Err(last) => Err(MonitorError::AllProvidersFailed {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Compare every endpoint's reported height against the primary and
    /// flag laggards. Run on a fixed period by the monitor.
    pub async fn run_health_check(&self, max_block_lag: u64) {
        let primary = match self.best() {
            Ok(endpoint) => endpoint,
            Err(_) => {
                warn!("health check skipped: no healthy provider to use as primary");
                return;
            }
        };

        let primary_height = match primary.rpc.block_number().await {
            Ok(height) => height,
            Err(e) => {
                warn!(provider = %primary.name, error = %e, "primary height query failed");
                primary.health.lagging.store(true, Ordering::Relaxed);
                return;
            }
        };
        primary.health.lagging.store(false, Ordering::Relaxed);

        for endpoint in &self.endpoints {
            if Arc::ptr_eq(endpoint, &primary) {
                continue;
            }
            let lagging = match endpoint.rpc.block_number().await {
                Ok(height) => primary_height.saturating_sub(height) > max_block_lag,
                Err(e) => {
                    debug!(provider = %endpoint.name, error = %e, "height check failed");
                    true
                }
            };
            let was = endpoint.health.lagging.swap(lagging, Ordering::Relaxed);
            if lagging && !was {
                warn!(provider = %endpoint.name, "provider marked unhealthy (lagging or unreachable)");
            }
        }
    }

    /// Health snapshots for the status query surface.
    pub fn snapshots(&self) -> Vec<ProviderHealthSnapshot> {
        self.endpoints.iter().map(|e| e.snapshot()).collect()
    }

    // Typed convenience wrappers, each with full fallback semantics.

    pub async fn block_number(&self) -> Result<u64> {
        self.with_fallback(|rpc| async move { rpc.block_number().await })
            .await
    }

    pub async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>> {
        self.with_fallback(move |rpc| async move { rpc.transaction(hash).await })
            .await
    }

    pub async fn block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>> {
        self.with_fallback(move |rpc| async move { rpc.block_with_txs(id).await })
            .await
    }

    pub async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.with_fallback(move |rpc| async move { rpc.pending_nonce(address).await })
            .await
    }

    pub async fn gas_price(&self) -> Result<U256> {
        self.with_fallback(|rpc| async move { rpc.gas_price().await })
            .await
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.with_fallback(move |rpc| async move { rpc.balance(address).await })
            .await
    }

    pub async fn call(&self, tx: TypedTransaction) -> Result<Bytes> {
        self.with_fallback(move |rpc| {
            let tx = tx.clone();
            async move { rpc.call(&tx).await }
        })
        .await
    }

    pub async fn estimate_gas(&self, tx: TypedTransaction) -> Result<u64> {
        self.with_fallback(move |rpc| {
            let tx = tx.clone();
            async move { rpc.estimate_gas(&tx).await }
        })
        .await
    }

    pub async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.with_fallback(move |rpc| async move { rpc.transaction_receipt(hash).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Stub that fails a fixed number of times before succeeding.
    struct FlakyRpc {
        name: String,
        fail_first: usize,
        calls: AtomicUsize,
        height: u64,
    }

    impl FlakyRpc {
        fn new(name: &str, fail_first: usize, height: u64) -> Arc<dyn ChainRpc> {
            Arc::new(Self {
                name: name.to_string(),
                fail_first,
                calls: AtomicUsize::new(0),
                height,
            })
        }

        fn fail(&self) -> MonitorError {
            MonitorError::Rpc {
                provider: self.name.clone(),
                message: "stub failure".to_string(),
            }
        }
    }

    #[async_trait]
    impl ChainRpc for FlakyRpc {
        fn name(&self) -> &str {
            &self.name
        }

        async fn block_number(&self) -> Result<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.fail())
            } else {
                Ok(self.height)
            }
        }

        async fn transaction(&self, _hash: TxHash) -> Result<Option<Transaction>> {
            Ok(None)
        }

        async fn block_with_txs(&self, _id: BlockId) -> Result<Option<Block<Transaction>>> {
            Ok(None)
        }

        async fn pending_nonce(&self, _address: Address) -> Result<u64> {
            Ok(0)
        }

        async fn gas_price(&self) -> Result<U256> {
            Ok(U256::from(30_000_000_000u64))
        }

        async fn balance(&self, _address: Address) -> Result<U256> {
            Ok(U256::zero())
        }

        async fn send_raw_transaction(&self, _raw: Bytes) -> Result<TxHash> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.fail())
            } else {
                Ok(TxHash::from_low_u64_be(0xbeef))
            }
        }

        async fn call(&self, _tx: &TypedTransaction) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<u64> {
            Ok(21_000)
        }

        async fn transaction_receipt(&self, _hash: TxHash) -> Result<Option<TransactionReceipt>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn fallback_recovers_single_provider_failure() {
        let pool = ProviderPool::from_rpcs(vec![
            (FlakyRpc::new("dead", usize::MAX, 0), 0),
            (FlakyRpc::new("alive", 0, 100), 1),
        ]);
        let height = pool.block_number().await.unwrap();
        assert_eq!(height, 100);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_all_providers_failed() {
        let pool = ProviderPool::from_rpcs(vec![
            (FlakyRpc::new("a", usize::MAX, 0), 0),
            (FlakyRpc::new("b", usize::MAX, 0), 1),
        ]);
        let err = pool.block_number().await.unwrap_err();
        match err {
            MonitorError::AllProvidersFailed { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected AllProvidersFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn broadcast_returns_first_success() {
        let pool = ProviderPool::from_rpcs(vec![
            (FlakyRpc::new("dead", usize::MAX, 0), 0),
            (FlakyRpc::new("alive", 0, 0), 1),
        ]);
        let hash = pool.broadcast(Bytes::from(vec![1, 2, 3]), 2).await.unwrap();
        assert_eq!(hash, TxHash::from_low_u64_be(0xbeef));
    }

    #[tokio::test]
    async fn error_rate_flips_health() {
        let pool = ProviderPool::from_rpcs(vec![(FlakyRpc::new("flaky", usize::MAX, 0), 0)]);

        // Below ten requests the endpoint keeps the benefit of the doubt.
        for _ in 0..9 {
            let _ = pool.block_number().await;
        }
        assert!(pool.snapshots()[0].healthy);

        for _ in 0..3 {
            let _ = pool.block_number().await;
        }
        let snapshot = &pool.snapshots()[0];
        assert!(!snapshot.healthy, "100% error rate over 12 requests");
        assert_eq!(snapshot.requests, 12);
    }
}
