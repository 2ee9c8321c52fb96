//! Typed configuration sections, one per component.
//!
//! Defaults are production-ready; `from_file` reads TOML; `apply_env`
//! overlays `SENTINEL_*` variables (the only sanctioned way to inject
//! secrets); `validate` rejects nonsense before anything connects.

use ethers::types::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Complete configuration for a Sentinel process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Redundant RPC endpoints, first entry is the initial primary.
    pub providers: Vec<ProviderEndpointConfig>,
    pub monitor: MonitorConfig,
    pub risk: RiskLimitsConfig,
    pub breaker: BreakerConfig,
    pub execution: ExecutionConfig,
    pub wallet: WalletConfig,
    pub relay: RelayConfig,
}

/// One RPC endpoint of the provider pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    pub name: String,
    pub http_url: String,
    /// WebSocket URL for subscriptions; endpoints without one are never
    /// chosen as the subscription source.
    pub ws_url: Option<String>,
    /// Lower is preferred when health and latency tie.
    pub priority: u32,
}

/// Chain event monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Plain transfers at or above this value are classified high-value (ETH).
    pub high_value_threshold_eth: f64,
    /// Contract addresses whose transactions are always interesting.
    pub monitored_contracts: Vec<String>,
    /// Pending-transaction cache entry lifetime (seconds).
    pub pending_ttl_secs: u64,
    /// Hard cap on pending-cache entries; oldest evicted first.
    pub pending_cache_max: usize,
    /// Dedup set is cleared wholesale above this size.
    pub dedup_max: usize,
    /// Cache sweep period (seconds).
    pub sweep_interval_secs: u64,
    /// Reorg scan period (seconds).
    pub reorg_check_secs: u64,
    /// Provider health check period (seconds).
    pub health_check_secs: u64,
    /// Blocks a provider may lag the primary before being marked unhealthy.
    pub max_block_lag: u64,
    /// Capacity of each broadcast topic; slow subscribers lose oldest events.
    pub topic_capacity: usize,
    /// Number of recent block intervals in the rolling block-time average.
    pub block_time_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            high_value_threshold_eth: 10.0,
            monitored_contracts: Vec::new(),
            pending_ttl_secs: 60,
            pending_cache_max: 10_000,
            dedup_max: 50_000,
            sweep_interval_secs: 10,
            reorg_check_secs: 5,
            health_check_secs: 30,
            max_block_lag: 5,
            topic_capacity: 1_024,
            block_time_window: 20,
        }
    }
}

/// Risk limits driving the admission checks and position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimitsConfig {
    /// Daily realized-loss budget (ETH); admissions stop when exhausted.
    pub max_daily_loss_eth: f64,
    /// Position bounds (ETH).
    pub min_position_eth: f64,
    pub max_position_eth: f64,
    /// Fraction of balance used as the sizing base.
    pub base_position_pct: f64,
    /// Never commit more than this fraction of the available balance.
    pub balance_cap_pct: f64,
    /// Gas price ceiling (gwei).
    pub gas_ceiling_gwei: u64,
    /// Required expected-profit / gas-cost ratio.
    pub min_profit_gas_ratio: Decimal,
    /// Token and venue risk score caps, 0-10 scale.
    pub max_token_risk: f64,
    pub max_venue_risk: f64,
    /// Estimated slippage cap (percent).
    pub max_slippage_pct: f64,
    /// Required liquidity as a multiple of trade size.
    pub liquidity_multiple: f64,
    /// Composite score ceiling; approval requires score below this.
    pub score_ceiling: f64,
    pub kelly: KellyConfig,
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_eth: 1.0,
            min_position_eth: 0.05,
            max_position_eth: 5.0,
            base_position_pct: 0.05,
            balance_cap_pct: 0.9,
            gas_ceiling_gwei: 300,
            min_profit_gas_ratio: dec!(2.0),
            max_token_risk: 6.0,
            max_venue_risk: 6.0,
            max_slippage_pct: 1.0,
            liquidity_multiple: 10.0,
            score_ceiling: 7.0,
            kelly: KellyConfig::default(),
        }
    }
}

/// Fractional Kelly sizing; inactive until enough history accumulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Trades recorded before Kelly scaling activates.
    pub min_trades: usize,
    /// Fraction of full Kelly applied.
    pub fraction: f64,
    /// Trade history window retained for the estimate.
    pub history_cap: usize,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            min_trades: 20,
            fraction: 0.25,
            history_cap: 200,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub max_consecutive_failures: u32,
    /// Failures within the trailing hour before the breaker opens.
    pub max_hourly_failures: u32,
    /// Cooldown before OPEN transitions to HALF_OPEN (seconds).
    pub cooldown_secs: u64,
    /// Per-strategy failure count that disables just that strategy.
    pub strategy_disable_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            max_hourly_failures: 20,
            cooldown_secs: 300,
            strategy_disable_threshold: 10,
        }
    }
}

/// Execution engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Chain id used when signing (1 = mainnet).
    pub chain_id: u64,
    /// In-flight execution cap.
    pub max_concurrent: usize,
    /// Standard-dispatch confirmation wait bound (seconds).
    pub confirmation_timeout_secs: u64,
    /// Receipt poll interval (milliseconds).
    pub poll_interval_ms: u64,
    /// Simulated net profit floor, independent of the strategy's estimate (ETH).
    pub min_sim_profit_eth: f64,
    /// Providers a signed transaction is broadcast to in parallel.
    pub broadcast_top_k: usize,
    /// Bundles target current head + this many blocks.
    pub bundle_blocks_ahead: u64,
    /// On-chain executor contract for arbitrage paths.
    pub arb_executor_contract: String,
    /// On-chain entry point for flash-loan executions.
    pub flashloan_contract: String,
    /// Burner wallets generated at startup for adversarial flow.
    pub burner_count: usize,
    /// Risk score at or above which execution prefers a burner wallet.
    pub burner_risk_threshold: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            max_concurrent: 5,
            confirmation_timeout_secs: 30,
            poll_interval_ms: 500,
            min_sim_profit_eth: 0.005,
            broadcast_top_k: 3,
            bundle_blocks_ahead: 1,
            arb_executor_contract: "0x0000000000000000000000000000000000000000".to_string(),
            flashloan_contract: "0x0000000000000000000000000000000000000000".to_string(),
            burner_count: 3,
            burner_risk_threshold: 5.0,
        }
    }
}

/// Wallet keys. Only ever populated from the environment in production.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Hex private key of the main wallet.
    pub main_private_key: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            main_private_key: String::new(),
        }
    }
}

/// Private bundle relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
    /// Key used to sign relay payloads; distinct from any funded wallet.
    pub signing_key: String,
    /// Blocks past the target to keep polling for inclusion.
    pub inclusion_poll_blocks: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "https://relay.flashbots.net".to_string(),
            signing_key: String::new(),
            inclusion_poll_blocks: 2,
        }
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderEndpointConfig {
                name: "primary".to_string(),
                http_url: "http://127.0.0.1:8545".to_string(),
                ws_url: Some("ws://127.0.0.1:8546".to_string()),
                priority: 0,
            }],
            monitor: MonitorConfig::default(),
            risk: RiskLimitsConfig::default(),
            breaker: BreakerConfig::default(),
            execution: ExecutionConfig::default(),
            wallet: WalletConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Overlay environment variables. Secrets (wallet and relay keys) are
    /// expected to arrive this way rather than through the file.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("SENTINEL_PRIVATE_KEY") {
            self.wallet.main_private_key = key;
        }
        if let Ok(key) = std::env::var("SENTINEL_RELAY_SIGNING_KEY") {
            self.relay.signing_key = key;
        }
        if let Ok(url) = std::env::var("SENTINEL_RELAY_URL") {
            self.relay.url = url;
        }
        if let Ok(gas) = std::env::var("SENTINEL_MAX_GAS_GWEI") {
            if let Ok(value) = gas.parse::<u64>() {
                self.risk.gas_ceiling_gwei = value;
            }
        }
        if let Ok(profit) = std::env::var("SENTINEL_MIN_SIM_PROFIT_ETH") {
            if let Ok(value) = profit.parse::<f64>() {
                self.execution.min_sim_profit_eth = value;
            }
        }
        if let Ok(cap) = std::env::var("SENTINEL_MAX_CONCURRENT") {
            if let Ok(value) = cap.parse::<usize>() {
                self.execution.max_concurrent = value;
            }
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one RPC provider must be configured");
        }
        if !self.providers.iter().any(|p| p.ws_url.is_some()) {
            anyhow::bail!("at least one provider needs a ws_url for subscriptions");
        }

        if self.risk.score_ceiling <= 0.0 || self.risk.score_ceiling > 10.0 {
            anyhow::bail!("score_ceiling must be in (0, 10]");
        }
        if self.risk.min_position_eth > self.risk.max_position_eth {
            anyhow::bail!("min_position_eth must not exceed max_position_eth");
        }
        if !(0.0..=1.0).contains(&self.risk.balance_cap_pct) {
            anyhow::bail!("balance_cap_pct must be between 0 and 1");
        }
        if self.risk.gas_ceiling_gwei == 0 {
            anyhow::bail!("gas_ceiling_gwei must be positive");
        }
        if !(0.0..=1.0).contains(&self.risk.kelly.fraction) {
            anyhow::bail!("kelly.fraction must be between 0 and 1");
        }

        if self.breaker.max_consecutive_failures == 0 {
            anyhow::bail!("max_consecutive_failures must be positive");
        }
        if self.breaker.cooldown_secs == 0 {
            anyhow::bail!("cooldown_secs must be positive");
        }

        if self.execution.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be positive");
        }
        if self.execution.broadcast_top_k == 0 {
            anyhow::bail!("broadcast_top_k must be positive");
        }
        self.execution
            .arb_executor_contract
            .parse::<Address>()
            .map_err(|_| anyhow::anyhow!("invalid arb_executor_contract address"))?;
        self.execution
            .flashloan_contract
            .parse::<Address>()
            .map_err(|_| anyhow::anyhow!("invalid flashloan_contract address"))?;

        for contract in &self.monitor.monitored_contracts {
            contract
                .parse::<Address>()
                .map_err(|_| anyhow::anyhow!("invalid monitored contract address: {contract}"))?;
        }

        Ok(())
    }

    /// Monitored contract set parsed to addresses. Call after `validate`.
    pub fn monitored_addresses(&self) -> Vec<Address> {
        self.monitor
            .monitored_contracts
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        let config = SentinelConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let config = SentinelConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SentinelConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.breaker.max_consecutive_failures,
            config.breaker.max_consecutive_failures
        );
        assert_eq!(parsed.risk.gas_ceiling_gwei, config.risk.gas_ceiling_gwei);
    }

    #[test]
    fn from_file_reads_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[risk]
gas_ceiling_gwei = 150

[execution]
max_concurrent = 2
"#
        )
        .unwrap();

        let config = SentinelConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.risk.gas_ceiling_gwei, 150);
        assert_eq!(config.execution.max_concurrent, 2);
        // Unspecified sections keep their defaults.
        assert_eq!(config.breaker.max_consecutive_failures, 5);
    }

    #[test]
    fn rejects_empty_provider_list() {
        let mut config = SentinelConfig::default();
        config.providers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_contract_address() {
        let mut config = SentinelConfig::default();
        config.execution.arb_executor_contract = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
