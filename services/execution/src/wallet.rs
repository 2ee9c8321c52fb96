//! Wallet selection: one funded main wallet plus a rotation of burner
//! wallets for adversarial flow.
//!
//! Burners are generated fresh at startup and never reused across runs;
//! sandwich-style opportunities and anything above the configured risk
//! threshold rotate through them round-robin.

use std::sync::atomic::{AtomicUsize, Ordering};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use tracing::info;

use types::OpportunityKind;

use crate::error::{ExecutionError, Result};

pub struct WalletManager {
    main: LocalWallet,
    burners: Vec<LocalWallet>,
    next_burner: AtomicUsize,
    burner_risk_threshold: f64,
}

impl WalletManager {
    pub fn new(
        main_private_key: &str,
        chain_id: u64,
        burner_count: usize,
        burner_risk_threshold: f64,
    ) -> Result<Self> {
        let main = main_private_key
            .parse::<LocalWallet>()
            .map_err(|e| ExecutionError::Signing(format!("invalid main wallet key: {e}")))?
            .with_chain_id(chain_id);

        let mut rng = rand::thread_rng();
        let burners: Vec<LocalWallet> = (0..burner_count)
            .map(|_| LocalWallet::new(&mut rng).with_chain_id(chain_id))
            .collect();

        info!(
            main = %main.address(),
            burners = burners.len(),
            "wallet manager initialised"
        );

        Ok(Self {
            main,
            burners,
            next_burner: AtomicUsize::new(0),
            burner_risk_threshold,
        })
    }

    /// Pick the signing wallet for one opportunity. Adversarial kinds and
    /// high risk scores go to burners (round-robin); everything else uses
    /// the main wallet.
    pub fn select(&self, kind: &OpportunityKind, risk_score: f64) -> &LocalWallet {
        let wants_burner = kind.is_adversarial() || risk_score >= self.burner_risk_threshold;
        if wants_burner && !self.burners.is_empty() {
            let index = self.next_burner.fetch_add(1, Ordering::Relaxed) % self.burners.len();
            &self.burners[index]
        } else {
            &self.main
        }
    }

    pub fn main_address(&self) -> Address {
        self.main.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{TxHash, U256};

    const TEST_KEY: &str = "0x0123456789012345678901234567890123456789012345678901234567890123";

    fn sandwich() -> OpportunityKind {
        OpportunityKind::Sandwich {
            victim_tx: TxHash::zero(),
            router: Address::zero(),
            token_in: Address::zero(),
            token_out: Address::zero(),
            front_amount_wei: U256::zero(),
        }
    }

    #[test]
    fn low_risk_arbitrage_uses_main_wallet() {
        let wallets = WalletManager::new(TEST_KEY, 1, 2, 5.0).unwrap();
        let selected = wallets.select(&OpportunityKind::Arbitrage { path: Vec::new() }, 2.0);
        assert_eq!(selected.address(), wallets.main_address());
    }

    #[test]
    fn sandwich_rotates_burners() {
        let wallets = WalletManager::new(TEST_KEY, 1, 2, 5.0).unwrap();
        let first = wallets.select(&sandwich(), 0.0).address();
        let second = wallets.select(&sandwich(), 0.0).address();
        let third = wallets.select(&sandwich(), 0.0).address();

        assert_ne!(first, wallets.main_address());
        assert_ne!(second, wallets.main_address());
        assert_ne!(first, second, "round-robin must rotate");
        assert_eq!(first, third, "two burners wrap around");
    }

    #[test]
    fn high_risk_score_prefers_burner_even_for_arbitrage() {
        let wallets = WalletManager::new(TEST_KEY, 1, 2, 5.0).unwrap();
        let selected = wallets.select(&OpportunityKind::Arbitrage { path: Vec::new() }, 6.5);
        assert_ne!(selected.address(), wallets.main_address());
    }

    #[test]
    fn no_burners_falls_back_to_main() {
        let wallets = WalletManager::new(TEST_KEY, 1, 0, 5.0).unwrap();
        let selected = wallets.select(&sandwich(), 9.0);
        assert_eq!(selected.address(), wallets.main_address());
    }
}
