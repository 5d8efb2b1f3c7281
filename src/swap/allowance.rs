//! Spending-allowance reconciliation for the source token

use crate::chain::erc20::approve_calldata;
use crate::chain::{ChainClient, Token, TransactionOutcome, TxRequest};
use crate::config::AllowanceFallback;
use crate::error::{ConfigError, SwapError, SwapResult};
use crate::tx;
use crate::units;

use ethers::types::{Address, U256};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AllowanceDecision {
    /// Native asset, nothing to approve
    NotRequired,
    AlreadySufficient { allowance: U256 },
    /// The token could not report an allowance and policy said to carry on
    AssumedSufficient,
    Submitted(TransactionOutcome),
}

pub struct AllowanceManager<'a> {
    chain: &'a dyn ChainClient,
    fallback: AllowanceFallback,
}

impl<'a> AllowanceManager<'a> {
    pub fn new(chain: &'a dyn ChainClient, fallback: AllowanceFallback) -> Self {
        Self { chain, fallback }
    }

    /// Make sure `spender` may move `readable_amount` of `token` from `owner`.
    /// Calling it again once the allowance is in place sends nothing.
    pub async fn ensure_allowance(
        &self,
        token: &Token,
        owner: Address,
        spender: Address,
        readable_amount: &str,
    ) -> SwapResult<AllowanceDecision> {
        if token.is_native() {
            return Ok(AllowanceDecision::NotRequired);
        }

        let required = units::from_readable(readable_amount, token.decimals).map_err(|reason| {
            ConfigError::InvalidAmount {
                amount: readable_amount.to_string(),
                reason,
            }
        })?;

        match self.chain.allowance(token.address, owner, spender).await? {
            Some(allowance) if allowance >= required => {
                info!(
                    "Allowance of {} for {:?} already covers {} ({} raw)",
                    token, spender, readable_amount, allowance
                );
                Ok(AllowanceDecision::AlreadySufficient { allowance })
            }
            Some(allowance) => {
                info!(
                    "Allowance of {} for {:?} is {} raw, {} raw required",
                    token, spender, allowance, required
                );
                self.approve(token, spender, required).await
            }
            None => match self.fallback {
                AllowanceFallback::AssumeSufficient => {
                    warn!(
                        "{} has no allowance() interface; policy assume_sufficient, skipping approval",
                        token
                    );
                    Ok(AllowanceDecision::AssumedSufficient)
                }
                AllowanceFallback::Approve => {
                    warn!(
                        "{} has no allowance() interface; policy approve, sending approval anyway",
                        token
                    );
                    self.approve(token, spender, required).await
                }
                AllowanceFallback::Abort => {
                    warn!("{} has no allowance() interface; policy abort", token);
                    Err(SwapError::AllowanceUnavailable {
                        chain_id: token.chain_id,
                        token: token.to_string(),
                    })
                }
            },
        }
    }

    async fn approve(
        &self,
        token: &Token,
        spender: Address,
        amount: U256,
    ) -> SwapResult<AllowanceDecision> {
        let request = TxRequest {
            to: token.address,
            data: approve_calldata(spender, amount),
            value: U256::zero(),
            kind: "approve",
        };
        let outcome = tx::submit_and_confirm(self.chain, &request).await?;
        Ok(AllowanceDecision::Submitted(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::registry::{self, ETH_MAINNET};
    use crate::chain::MockChainClient;
    use ethers::types::H256;

    fn usdc() -> Token {
        registry::lookup(ETH_MAINNET, "USDC").unwrap()
    }

    fn owner() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn spender() -> Address {
        Address::repeat_byte(0x5b)
    }

    fn approve_outcome(success: bool) -> TransactionOutcome {
        TransactionOutcome {
            chain_id: ETH_MAINNET,
            tx_hash: H256::repeat_byte(0xa9),
            success,
            block_number: Some(19_000_000),
            gas_used: Some(U256::from(46_000u64)),
        }
    }

    #[tokio::test]
    async fn test_native_never_touches_chain() {
        let eth = registry::lookup(ETH_MAINNET, "ETH").unwrap();
        // no expectations: any call would panic
        let chain = MockChainClient::new();
        let manager = AllowanceManager::new(&chain, AllowanceFallback::Approve);

        for amount in ["0.000000000000000001", "0.05", "1000000"] {
            let decision = manager
                .ensure_allowance(&eth, owner(), spender(), amount)
                .await
                .unwrap();
            assert_eq!(decision, AllowanceDecision::NotRequired);
        }
    }

    #[tokio::test]
    async fn test_sufficient_allowance_is_idempotent() {
        let mut chain = MockChainClient::new();
        chain
            .expect_allowance()
            .withf(|token, o, s| *token == usdc().address && *o == owner() && *s == spender())
            .times(3)
            .returning(|_, _, _| Ok(Some(U256::from(25_000_000u64))));
        chain.expect_send_transaction().never();

        let manager = AllowanceManager::new(&chain, AllowanceFallback::AssumeSufficient);
        for _ in 0..3 {
            let decision = manager
                .ensure_allowance(&usdc(), owner(), spender(), "25")
                .await
                .unwrap();
            assert_eq!(
                decision,
                AllowanceDecision::AlreadySufficient {
                    allowance: U256::from(25_000_000u64)
                }
            );
        }
    }

    #[tokio::test]
    async fn test_insufficient_allowance_sends_exact_approval() {
        let mut chain = MockChainClient::new();
        chain.expect_chain_id().return_const(ETH_MAINNET);
        chain
            .expect_allowance()
            .times(1)
            .returning(|_, _, _| Ok(Some(U256::zero())));
        chain
            .expect_send_transaction()
            .withf(|r| {
                r.kind == "approve"
                    && r.to == usdc().address
                    && r.value.is_zero()
                    && r.data == approve_calldata(spender(), U256::from(12_500_000u64))
            })
            .times(1)
            .returning(|_| Ok(approve_outcome(true)));

        let manager = AllowanceManager::new(&chain, AllowanceFallback::AssumeSufficient);
        let decision = manager
            .ensure_allowance(&usdc(), owner(), spender(), "12.5")
            .await
            .unwrap();

        assert_eq!(decision, AllowanceDecision::Submitted(approve_outcome(true)));
    }

    #[tokio::test]
    async fn test_failed_approval_is_fatal() {
        let mut chain = MockChainClient::new();
        chain.expect_chain_id().return_const(ETH_MAINNET);
        chain
            .expect_allowance()
            .returning(|_, _, _| Ok(Some(U256::from(1u64))));
        chain
            .expect_send_transaction()
            .times(1)
            .returning(|_| Ok(approve_outcome(false)));

        let manager = AllowanceManager::new(&chain, AllowanceFallback::AssumeSufficient);
        let err = manager
            .ensure_allowance(&usdc(), owner(), spender(), "1")
            .await
            .unwrap_err();

        assert!(matches!(err, SwapError::ChainTxFailure { tx_hash, .. } if tx_hash == H256::repeat_byte(0xa9)));
    }

    #[tokio::test]
    async fn test_unavailable_allowance_follows_policy() {
        let unavailable = || {
            let mut chain = MockChainClient::new();
            chain.expect_chain_id().return_const(ETH_MAINNET);
            chain.expect_allowance().returning(|_, _, _| Ok(None));
            chain
        };

        let chain = unavailable();
        let decision = AllowanceManager::new(&chain, AllowanceFallback::AssumeSufficient)
            .ensure_allowance(&usdc(), owner(), spender(), "5")
            .await
            .unwrap();
        assert_eq!(decision, AllowanceDecision::AssumedSufficient);

        let chain = unavailable();
        let err = AllowanceManager::new(&chain, AllowanceFallback::Abort)
            .ensure_allowance(&usdc(), owner(), spender(), "5")
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::AllowanceUnavailable { chain_id: ETH_MAINNET, .. }));

        let mut chain = unavailable();
        chain
            .expect_send_transaction()
            .times(1)
            .returning(|_| Ok(approve_outcome(true)));
        let decision = AllowanceManager::new(&chain, AllowanceFallback::Approve)
            .ensure_allowance(&usdc(), owner(), spender(), "5")
            .await
            .unwrap();
        assert!(matches!(decision, AllowanceDecision::Submitted(_)));
    }

    #[tokio::test]
    async fn test_rpc_failure_is_not_treated_as_unavailable() {
        let mut chain = MockChainClient::new();
        chain.expect_allowance().returning(|_, _, _| {
            Err(SwapError::ChainConnection {
                chain_id: ETH_MAINNET,
                message: "connection refused".to_string(),
            })
        });
        chain.expect_send_transaction().never();

        let err = AllowanceManager::new(&chain, AllowanceFallback::AssumeSufficient)
            .ensure_allowance(&usdc(), owner(), spender(), "5")
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::ChainConnection { .. }));
    }
}
