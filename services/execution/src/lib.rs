//! # Execution Engine
//!
//! Turns an approved opportunity into one or more signed transactions,
//! simulates them, dispatches through one of three paths (standard
//! broadcast, private relay bundle, flash-loan contract call), and
//! reconciles the terminal outcome.
//!
//! Hard guarantees:
//! - nonces issued from one wallet are strictly increasing and contiguous
//!   within a plan (the per-wallet counter is the single mutual-exclusion
//!   boundary in the engine);
//! - nothing is submitted that did not pass simulation with net profit at
//!   or above the configured floor, independent of the strategy's estimate;
//! - every execution yields exactly one [`types::ExecutionOutcome`].

pub mod builder;
pub mod engine;
pub mod error;
pub mod nonce;
pub mod relay;
pub mod simulator;
pub mod wallet;

pub use builder::TxBuilder;
pub use engine::{EngineStatus, ExecutionEngine, ProfitCalculator};
pub use error::{ExecutionError, Result};
pub use nonce::NonceManager;
pub use relay::{BundleRelay, BundleSimulation, RelayApi};
pub use simulator::Simulator;
pub use wallet::WalletManager;
