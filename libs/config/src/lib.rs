//! # Sentinel Configuration
//!
//! One immutable configuration object, loaded at startup and passed into
//! each component's constructor. Supports TOML file loading, environment
//! variable overrides, and full validation with detailed error reporting.
//! No component reads the environment after startup.

mod settings;

pub use settings::{
    BreakerConfig, ExecutionConfig, KellyConfig, MonitorConfig, ProviderEndpointConfig,
    RelayConfig, RiskLimitsConfig, SentinelConfig, WalletConfig,
};
