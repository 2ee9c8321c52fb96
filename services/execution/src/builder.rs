//! Transaction construction per opportunity kind.
//!
//! Explicit pattern matching over [`OpportunityKind`] is the boundary
//! where strategy-specific payloads become concrete calldata: a single
//! executor-contract call for arbitrage and liquidation, a front/backrun
//! pair for sandwich, a single entry-point call for flash loans.

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;

use config::ExecutionConfig;
use types::{DispatchMode, Opportunity, OpportunityKind, PlannedTx};

use crate::error::{ExecutionError, Result};

pub struct TxBuilder {
    arb_executor: Address,
    flashloan_contract: Address,
}

impl TxBuilder {
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        let arb_executor = config
            .arb_executor_contract
            .parse()
            .map_err(|_| ExecutionError::Signing("invalid arb executor address".to_string()))?;
        let flashloan_contract = config
            .flashloan_contract
            .parse()
            .map_err(|_| ExecutionError::Signing("invalid flashloan contract address".to_string()))?;
        Ok(Self {
            arb_executor,
            flashloan_contract,
        })
    }

    /// Build the transaction list and dispatch mode for one approved
    /// opportunity. `position_wei` is the admission-granted budget and
    /// caps every kind-supplied amount.
    pub fn build(
        &self,
        opp: &Opportunity,
        position_wei: U256,
        gas_price_wei: U256,
        bundle_target_block: u64,
    ) -> Result<(Vec<PlannedTx>, DispatchMode)> {
        match &opp.kind {
            OpportunityKind::Arbitrage { path } => {
                let pools: Vec<Token> = path.iter().map(|leg| Token::Address(leg.pool)).collect();
                let tokens: Vec<Token> = path
                    .iter()
                    .map(|leg| Token::Address(leg.token_in))
                    .collect();
                let data = calldata(
                    "executeRoute(address[],address[],uint256)",
                    &[
                        Token::Array(pools),
                        Token::Array(tokens),
                        Token::Uint(position_wei),
                    ],
                );
                let tx = PlannedTx {
                    to: self.arb_executor,
                    data,
                    value: U256::zero(),
                    gas_limit: opp.gas_estimate,
                    gas_price_wei,
                };
                Ok((vec![tx], DispatchMode::Standard))
            }

            OpportunityKind::Liquidation {
                protocol,
                account,
                debt_asset,
                collateral_asset,
                repay_amount_wei,
            } => {
                let repay = (*repay_amount_wei).min(position_wei);
                let data = calldata(
                    "executeLiquidation(address,address,address,address,uint256)",
                    &[
                        Token::Address(*protocol),
                        Token::Address(*account),
                        Token::Address(*debt_asset),
                        Token::Address(*collateral_asset),
                        Token::Uint(repay),
                    ],
                );
                let tx = PlannedTx {
                    to: self.arb_executor,
                    data,
                    value: U256::zero(),
                    gas_limit: opp.gas_estimate,
                    gas_price_wei,
                };
                Ok((vec![tx], DispatchMode::Standard))
            }

            OpportunityKind::Sandwich {
                router,
                token_in,
                token_out,
                front_amount_wei,
                ..
            } => {
                let amount = (*front_amount_wei).min(position_wei);
                let front = PlannedTx {
                    to: *router,
                    data: calldata(
                        "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
                        &[
                            Token::Uint(amount),
                            Token::Uint(U256::zero()),
                            Token::Array(vec![
                                Token::Address(*token_in),
                                Token::Address(*token_out),
                            ]),
                            Token::Address(self.arb_executor),
                            Token::Uint(U256::MAX),
                        ],
                    ),
                    value: U256::zero(),
                    gas_limit: opp.gas_estimate,
                    gas_price_wei,
                };
                let back = PlannedTx {
                    to: *router,
                    data: calldata(
                        "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
                        &[
                            Token::Uint(U256::zero()),
                            Token::Uint(U256::zero()),
                            Token::Array(vec![
                                Token::Address(*token_out),
                                Token::Address(*token_in),
                            ]),
                            Token::Address(self.arb_executor),
                            Token::Uint(U256::MAX),
                        ],
                    ),
                    value: U256::zero(),
                    gas_limit: opp.gas_estimate,
                    gas_price_wei,
                };
                Ok((
                    vec![front, back],
                    DispatchMode::Bundle {
                        target_block: bundle_target_block,
                    },
                ))
            }

            OpportunityKind::FlashLoan {
                provider,
                asset,
                amount_wei,
                params,
            } => {
                let data = calldata(
                    "executeFlashLoan(address,address,uint256,bytes)",
                    &[
                        Token::Address(*provider),
                        Token::Address(*asset),
                        Token::Uint(*amount_wei),
                        Token::Bytes(params.to_vec()),
                    ],
                );
                let tx = PlannedTx {
                    to: self.flashloan_contract,
                    data,
                    value: U256::zero(),
                    gas_limit: opp.gas_estimate,
                    gas_price_wei,
                };
                Ok((vec![tx], DispatchMode::FlashLoanCall))
            }

            OpportunityKind::CrossChain { .. } => Err(ExecutionError::UnsupportedKind("crosschain")),
        }
    }
}

/// Selector + ABI-encoded arguments.
fn calldata(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(encode(args));
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ethers::types::TxHash;
    use types::{eth_to_wei, MarketContext, SwapLeg};

    fn builder() -> TxBuilder {
        TxBuilder::new(&ExecutionConfig {
            arb_executor_contract: format!("{:?}", Address::from_low_u64_be(0xa1)),
            flashloan_contract: format!("{:?}", Address::from_low_u64_be(0xf1)),
            ..Default::default()
        })
        .unwrap()
    }

    fn opportunity(kind: OpportunityKind) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: 1,
            strategy: "test".to_string(),
            kind,
            expected_profit_wei: eth_to_wei(0.02),
            required_amount_wei: eth_to_wei(1.0),
            gas_estimate: 300_000,
            confidence: 0.8,
            priority: 100,
            created_at: now,
            expires_at: now + Duration::seconds(5),
            market: MarketContext::default(),
        }
    }

    #[test]
    fn arbitrage_builds_single_standard_tx() {
        let opp = opportunity(OpportunityKind::Arbitrage {
            path: vec![SwapLeg {
                venue: "univ2".to_string(),
                pool: Address::from_low_u64_be(0x10),
                token_in: Address::from_low_u64_be(0x20),
                token_out: Address::from_low_u64_be(0x21),
            }],
        });
        let (txs, mode) = builder()
            .build(&opp, eth_to_wei(0.5), U256::exp10(9), 100)
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(mode, DispatchMode::Standard);
        assert_eq!(txs[0].to, Address::from_low_u64_be(0xa1));
        // Selector of executeRoute(address[],address[],uint256).
        assert_eq!(&txs[0].data[..4], &id("executeRoute(address[],address[],uint256)")[..]);
    }

    #[test]
    fn sandwich_builds_front_back_bundle() {
        let opp = opportunity(OpportunityKind::Sandwich {
            victim_tx: TxHash::from_low_u64_be(9),
            router: Address::from_low_u64_be(0x30),
            token_in: Address::from_low_u64_be(0x20),
            token_out: Address::from_low_u64_be(0x21),
            front_amount_wei: eth_to_wei(2.0),
        });
        let (txs, mode) = builder()
            .build(&opp, eth_to_wei(1.0), U256::exp10(9), 123)
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(mode, DispatchMode::Bundle { target_block: 123 });
        // Both legs hit the router; amounts are capped by the position.
        assert_eq!(txs[0].to, Address::from_low_u64_be(0x30));
        assert_eq!(txs[1].to, Address::from_low_u64_be(0x30));
    }

    #[test]
    fn flashloan_targets_entry_point() {
        let opp = opportunity(OpportunityKind::FlashLoan {
            provider: Address::from_low_u64_be(0x40),
            asset: Address::from_low_u64_be(0x41),
            amount_wei: eth_to_wei(100.0),
            params: Bytes::from(vec![1, 2, 3]),
        });
        let (txs, mode) = builder()
            .build(&opp, eth_to_wei(1.0), U256::exp10(9), 100)
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(mode, DispatchMode::FlashLoanCall);
        assert_eq!(txs[0].to, Address::from_low_u64_be(0xf1));
    }

    #[test]
    fn crosschain_is_explicitly_unsupported() {
        let opp = opportunity(OpportunityKind::CrossChain {
            source_chain_id: 1,
            dest_chain_id: 137,
            bridge: Address::zero(),
        });
        let err = builder()
            .build(&opp, eth_to_wei(1.0), U256::exp10(9), 100)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedKind("crosschain")));
    }
}
