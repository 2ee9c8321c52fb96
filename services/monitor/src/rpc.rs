//! Narrow JSON-RPC surface the pipeline needs, behind a trait so the
//! provider pool can be exercised against in-memory stubs in tests.

use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Block, BlockId, BlockNumber, Bytes, Transaction, TransactionReceipt, TxHash, U256,
};
use url::Url;

use crate::error::{MonitorError, Result};

/// Per-call deadline applied to every RPC operation.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// The chain operations Sentinel performs over standard JSON-RPC.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint name, used in health records and error messages.
    fn name(&self) -> &str;

    async fn block_number(&self) -> Result<u64>;
    async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>>;
    async fn block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>>;
    /// Pending-state nonce, the seed for the in-memory nonce counter.
    async fn pending_nonce(&self, address: Address) -> Result<u64>;
    async fn gas_price(&self) -> Result<U256>;
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash>;
    /// `eth_call` against latest state; the simulation primitive.
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<u64>;
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>>;
}

/// Production implementation over an ethers HTTP provider with a pooled
/// client, mirroring the executor-side connection tuning.
pub struct EthersRpc {
    name: String,
    provider: Provider<Http>,
}

impl EthersRpc {
    pub fn new(name: impl Into<String>, http_url: &str) -> Result<Self> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .timeout(RPC_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| MonitorError::Rpc {
                provider: name.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let url: Url = http_url.parse().map_err(|e| MonitorError::Rpc {
            provider: name.clone(),
            message: format!("invalid RPC URL {http_url}: {e}"),
        })?;
        let provider = Provider::new(Http::new_with_client(url, client));

        Ok(Self { name, provider })
    }

    fn rpc_err(&self, err: impl std::fmt::Display) -> MonitorError {
        MonitorError::Rpc {
            provider: self.name.clone(),
            message: err.to_string(),
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, ethers::providers::ProviderError>>,
    {
        match tokio::time::timeout(RPC_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.rpc_err(e)),
            Err(_) => Err(MonitorError::Timeout {
                provider: self.name.clone(),
                timeout_ms: RPC_TIMEOUT.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl ChainRpc for EthersRpc {
    fn name(&self) -> &str {
        &self.name
    }

    async fn block_number(&self) -> Result<u64> {
        let number = self.timed(self.provider.get_block_number()).await?;
        Ok(number.as_u64())
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>> {
        self.timed(self.provider.get_transaction(hash)).await
    }

    async fn block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>> {
        self.timed(self.provider.get_block_with_txs(id)).await
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce = self
            .timed(
                self.provider
                    .get_transaction_count(address, Some(BlockNumber::Pending.into())),
            )
            .await?;
        Ok(nonce.as_u64())
    }

    async fn gas_price(&self) -> Result<U256> {
        self.timed(self.provider.get_gas_price()).await
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.timed(self.provider.get_balance(address, None)).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash> {
        match tokio::time::timeout(RPC_TIMEOUT, self.provider.send_raw_transaction(raw)).await {
            Ok(Ok(pending)) => Ok(pending.tx_hash()),
            Ok(Err(e)) => Err(self.rpc_err(e)),
            Err(_) => Err(MonitorError::Timeout {
                provider: self.name.clone(),
                timeout_ms: RPC_TIMEOUT.as_millis() as u64,
            }),
        }
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        self.timed(self.provider.call(tx, None)).await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<u64> {
        let estimate = self.timed(self.provider.estimate_gas(tx, None)).await?;
        Ok(estimate.as_u64())
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.timed(self.provider.get_transaction_receipt(hash)).await
    }
}
