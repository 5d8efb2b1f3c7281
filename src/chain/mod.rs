//! Chain module - the per-chain capability a swap session needs
//!
//! This module provides:
//! - The [`ChainClient`] trait: balances, allowance reads and signed submission
//! - An ethers-backed implementation with multi-RPC failover for reads
//! - The static token registry and ERC-20 bindings

pub mod erc20;
pub mod provider;
pub mod registry;

pub use provider::EvmChainClient;
pub use registry::Token;

use crate::error::SwapResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;

/// A transaction to be signed and submitted by the session wallet.
/// Gas parameters come from the chain's static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Short label used in logs and metrics ("approve", "swap")
    pub kind: &'static str,
}

/// Inclusion result of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub chain_id: u64,
    pub tx_hash: H256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Capability to read state from and submit transactions to one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Balance of `owner`; the zero token address means the native asset
    async fn balance(&self, token: Address, owner: Address) -> SwapResult<U256>;

    /// ERC-20 allowance. `Ok(None)` when the contract does not implement
    /// `allowance(address,address)`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> SwapResult<Option<U256>>;

    /// Sign, submit and wait for inclusion. Does not interpret the status.
    async fn send_transaction(&self, request: &TxRequest) -> SwapResult<TransactionOutcome>;
}
