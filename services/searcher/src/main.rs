use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chain_monitor::{ChainEventMonitor, DecoderRegistry, ProviderPool};
use config::SentinelConfig;
use execution::{BundleRelay, ExecutionEngine};
use risk::AdmissionController;
use types::eth_to_wei;

use searcher::{HighValueWatcher, PipelineEngine, TracingSink};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("🚀 Starting Sentinel...");

    // Configuration: optional TOML file path as the first argument,
    // environment overlays on top, validated before anything connects.
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            SentinelConfig::from_file(&path).with_context(|| format!("loading config {path}"))?
        }
        None => SentinelConfig::default(),
    };
    config.apply_env();
    config.validate().context("invalid configuration")?;
    info!(
        providers = config.providers.len(),
        score_ceiling = config.risk.score_ceiling,
        max_concurrent = config.execution.max_concurrent,
        "✅ configuration loaded"
    );

    // Provider pool and chain event monitor.
    let pool = Arc::new(ProviderPool::from_config(&config.providers).context("provider pool")?);
    let registry = DecoderRegistry::new(
        config.monitor.high_value_threshold_eth,
        config.monitored_addresses(),
    );
    let monitor = Arc::new(ChainEventMonitor::new(
        pool.clone(),
        registry,
        config.monitor.clone(),
    ));
    info!("✅ chain event monitor initialised");

    // Bundle relay. The signing key is an identity, not a funded wallet;
    // generate an ephemeral one when none is configured.
    if config.relay.signing_key.is_empty() {
        let ephemeral = LocalWallet::new(&mut rand::thread_rng());
        warn!(identity = %ephemeral.address(), "no relay signing key configured, using ephemeral identity");
        config.relay.signing_key = hex::encode(ephemeral.signer().to_bytes());
    }
    let relay = Arc::new(BundleRelay::new(&config.relay).context("bundle relay")?);

    // Risk gate and execution engine.
    let admission = Arc::new(AdmissionController::new(
        config.risk.clone(),
        config.breaker.clone(),
    ));
    let execution = Arc::new(
        ExecutionEngine::new(&config, pool.clone(), relay)
            .context("execution engine (is SENTINEL_PRIVATE_KEY set?)")?,
    );
    info!("✅ admission control and execution engine initialised");

    // Pipeline with the reference strategy registered.
    let main_wallet = config
        .wallet
        .main_private_key
        .parse::<LocalWallet>()
        .context("main wallet key")?
        .address();
    let mut pipeline = PipelineEngine::new(
        pool.clone(),
        monitor.clone(),
        admission,
        execution,
        Arc::new(TracingSink),
        main_wallet,
    );
    pipeline.register_strategy(Arc::new(HighValueWatcher::new(eth_to_wei(0.02), 300_000)));

    // Ingestion runs until shutdown; the pipeline drains strategies.
    let monitor_task = tokio::spawn(monitor.run());

    info!("📡 monitor subscriptions starting, pipeline live");
    tokio::select! {
        _ = pipeline.run() => {
            warn!("pipeline stopped");
        }
        result = monitor_task => {
            match result {
                Ok(Ok(())) => info!("monitor finished"),
                Ok(Err(e)) => warn!(error = %e, "monitor failed"),
                Err(e) => warn!(error = %e, "monitor task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("sentinel stopped");
    Ok(())
}
