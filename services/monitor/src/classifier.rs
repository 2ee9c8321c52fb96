//! Decoder registry: classifies raw transactions by destination address or
//! 4-byte method selector, and decides whether a transaction is worth
//! emitting at all.

use std::collections::{HashMap, HashSet};

use ethers::types::{Address, Transaction, U256};

use types::{eth_to_wei, TxClass};

/// Well-known selectors registered by default. Covers the router and
/// lending surfaces the pipeline cares about; strategies needing more
/// register their own.
const SWAP_SELECTORS: [[u8; 4]; 7] = [
    [0x38, 0xed, 0x17, 0x39], // swapExactTokensForTokens
    [0x88, 0x03, 0xdb, 0xee], // swapTokensForExactTokens
    [0x7f, 0xf3, 0x6a, 0xb5], // swapExactETHForTokens
    [0x18, 0xcb, 0xaf, 0xe5], // swapExactTokensForETH
    [0x41, 0x4b, 0xf3, 0x89], // exactInputSingle
    [0xc0, 0x4b, 0x8d, 0x59], // exactInput
    [0x35, 0x93, 0x56, 0x4c], // universal router execute
];

const LIQUIDATION_SELECTORS: [[u8; 4]; 2] = [
    [0x00, 0xa7, 0x18, 0xa9], // liquidationCall (Aave)
    [0xf5, 0xe3, 0xc4, 0x62], // liquidateBorrow (Compound)
];

const FLASHLOAN_SELECTORS: [[u8; 4]; 3] = [
    [0xab, 0x9c, 0x4b, 0x5d], // flashLoan (Aave V2/V3)
    [0x42, 0xb0, 0xb7, 0x7c], // flashLoanSimple (Aave V3)
    [0x5c, 0x38, 0x44, 0x9e], // flashLoan (Balancer vault)
];

/// Registry keyed by `to` address or method selector.
pub struct DecoderRegistry {
    by_selector: HashMap<[u8; 4], TxClass>,
    by_address: HashMap<Address, TxClass>,
    monitored: HashSet<Address>,
    high_value_threshold_wei: U256,
}

impl DecoderRegistry {
    /// Registry with the default selector tables.
    pub fn new(high_value_threshold_eth: f64, monitored: Vec<Address>) -> Self {
        let mut by_selector = HashMap::new();
        for s in SWAP_SELECTORS {
            by_selector.insert(s, TxClass::Swap);
        }
        for s in LIQUIDATION_SELECTORS {
            by_selector.insert(s, TxClass::Liquidation);
        }
        for s in FLASHLOAN_SELECTORS {
            by_selector.insert(s, TxClass::FlashLoan);
        }

        Self {
            by_selector,
            by_address: HashMap::new(),
            monitored: monitored.into_iter().collect(),
            high_value_threshold_wei: eth_to_wei(high_value_threshold_eth),
        }
    }

    /// Register a contract whose transactions always decode to `class`.
    /// The address is also added to the monitored set.
    pub fn register_address(&mut self, address: Address, class: TxClass) {
        self.by_address.insert(address, class);
        self.monitored.insert(address);
    }

    /// Register an additional method selector.
    pub fn register_selector(&mut self, selector: [u8; 4], class: TxClass) {
        self.by_selector.insert(selector, class);
    }

    fn selector_of(tx: &Transaction) -> Option<[u8; 4]> {
        if tx.input.0.len() < 4 {
            return None;
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&tx.input.0[..4]);
        Some(selector)
    }

    /// All classifications a transaction carries, decoder match first so
    /// `primary_class` reports the most specific kind. Empty means the
    /// transaction decoded to nothing notable.
    pub fn classify(&self, tx: &Transaction) -> Vec<TxClass> {
        let mut classes = Vec::new();

        let decoded = Self::selector_of(tx)
            .and_then(|s| self.by_selector.get(&s).copied())
            .or_else(|| tx.to.and_then(|to| self.by_address.get(&to).copied()));
        if let Some(class) = decoded {
            classes.push(class);
        }

        if tx.value >= self.high_value_threshold_wei && !self.high_value_threshold_wei.is_zero() {
            classes.push(TxClass::HighValue);
        }

        if classes.is_empty() && self.is_interesting(tx) {
            classes.push(TxClass::Generic);
        }

        classes
    }

    /// A transaction is interesting if it moves at least the high-value
    /// threshold, targets a monitored contract, or carries calldata.
    pub fn is_interesting(&self, tx: &Transaction) -> bool {
        if !self.high_value_threshold_wei.is_zero() && tx.value >= self.high_value_threshold_wei {
            return true;
        }
        if let Some(to) = tx.to {
            if self.monitored.contains(&to) {
                return true;
            }
        }
        !tx.input.0.is_empty()
    }
}
