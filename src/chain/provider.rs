//! Ethers-backed chain client with multi-RPC failover for reads

use super::erc20::{self, Erc20};
use super::{ChainClient, TransactionOutcome, TxRequest};
use crate::config::ChainConfig;
use crate::error::{SwapError, SwapResult};
use crate::tx::gas::{self, GasPolicy, GasPrice};
use crate::tx::NonceManager;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Chain client that signs with the session wallet
pub struct EvmChainClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Arc<Provider<Http>>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Session wallet, bound to this chain's ID
    wallet: LocalWallet,
    nonces: NonceManager,
    gas: GasPolicy,
}

impl EvmChainClient {
    /// Create a new chain client
    pub fn new(config: ChainConfig, wallet: LocalWallet) -> SwapResult<Self> {
        let mut http_providers = Vec::new();

        for url in config.rpc_urls.iter().filter(|u| !u.trim().is_empty()) {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider =
                        provider.interval(Duration::from_millis(config.receipt_poll_ms));
                    http_providers.push(Arc::new(provider));
                    debug!("Added HTTP provider for chain {}", config.chain_id);
                }
                Err(e) => {
                    // the URL usually embeds an API key, keep it out of the logs
                    warn!(
                        "Failed to create provider for chain {}: {}",
                        config.chain_id, e
                    );
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SwapError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let wallet = wallet.with_chain_id(config.chain_id);
        let nonces = NonceManager::new(config.chain_id);
        let gas = GasPolicy::from_chain_config(&config);

        info!(
            "Chain {} ({}) client ready with {} RPC endpoint(s)",
            config.name,
            config.chain_id,
            http_providers.len()
        );

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            wallet,
            nonces,
            gas,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Arc<Provider<Http>> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!(
            "Chain {} failover to provider {}",
            self.config.chain_id, next
        );
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.http().get_block_number().await {
            Ok(block) => {
                debug!("Chain {} at block {}", self.config.chain_id, block);
                true
            }
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    fn connection_error(&self, message: impl ToString) -> SwapError {
        SwapError::ChainConnection {
            chain_id: self.config.chain_id,
            message: message.to_string(),
        }
    }

    async fn pending_nonce(&self) -> SwapResult<u64> {
        let nonce = self
            .http()
            .get_transaction_count(self.wallet.address(), Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.connection_error(e))?;
        Ok(nonce.as_u64())
    }

    async fn gas_price(&self) -> SwapResult<GasPrice> {
        if let Some(price) = &self.gas.fixed_price {
            return Ok(price.clone());
        }
        let price = self
            .http()
            .get_gas_price()
            .await
            .map_err(|e| self.connection_error(e))?;
        Ok(GasPrice::Legacy(price))
    }

    async fn read_balance(
        &self,
        provider: &Arc<Provider<Http>>,
        token: Address,
        owner: Address,
    ) -> Result<U256, String> {
        if token.is_zero() {
            provider
                .get_balance(owner, None)
                .await
                .map_err(|e| e.to_string())
        } else {
            Erc20::new(token, provider.clone())
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| e.to_string())
        }
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn balance(&self, token: Address, owner: Address) -> SwapResult<U256> {
        let mut last_error = String::new();
        for _ in 0..self.http_providers.len() {
            match self.read_balance(self.http(), token, owner).await {
                Ok(balance) => return Ok(balance),
                Err(e) => {
                    warn!(
                        "Failed to read balance on chain {}: {}",
                        self.config.chain_id, e
                    );
                    last_error = e;
                    self.failover();
                }
            }
        }

        Err(self.connection_error(format!("All providers failed: {}", last_error)))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> SwapResult<Option<U256>> {
        let contract = Erc20::new(token, self.http().clone());
        match contract.allowance(owner, spender).call().await {
            Ok(allowance) => Ok(Some(allowance)),
            Err(e) if erc20::is_interface_mismatch(&e) => {
                debug!("Token {:?} did not answer allowance(): {}", token, e);
                Ok(None)
            }
            Err(e) => Err(self.connection_error(e)),
        }
    }

    async fn send_transaction(&self, request: &TxRequest) -> SwapResult<TransactionOutcome> {
        let chain_id = self.config.chain_id;
        let nonce = self.nonces.next(|| self.pending_nonce()).await?;

        let gas_price = match self.gas_price().await {
            Ok(price) => price,
            Err(e) => {
                self.nonces.release(nonce).await;
                return Err(e);
            }
        };
        let tx = gas::build_typed_tx(request, chain_id, nonce.into(), self.gas.gas_limit, &gas_price);
        debug!(
            "{} transaction on chain {}: nonce {}, worst-case gas cost {} wei",
            request.kind,
            chain_id,
            nonce,
            self.gas.max_cost(&gas_price)
        );

        let signature = match self.wallet.sign_transaction(&tx).await {
            Ok(sig) => sig,
            Err(e) => {
                self.nonces.release(nonce).await;
                return Err(SwapError::Wallet(e.to_string()));
            }
        };
        let signed_tx = tx.rlp_signed(&signature);

        let provider = self.http();
        let send_timeout = Duration::from_secs(self.config.send_timeout_secs);
        let pending = match timeout(send_timeout, provider.send_raw_transaction(signed_tx)).await {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => {
                self.nonces.release(nonce).await;
                return Err(SwapError::Transaction {
                    chain_id,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                // the node may or may not have accepted it
                self.nonces.reset().await;
                return Err(SwapError::Transaction {
                    chain_id,
                    message: format!("send timed out after {:?}", send_timeout),
                });
            }
        };

        let tx_hash = pending.tx_hash();
        info!(
            "{} transaction sent on chain {}: {:?} (nonce {})",
            request.kind, chain_id, tx_hash, nonce
        );

        let receipt = pending
            .confirmations(self.config.confirmations)
            .await
            .map_err(|e| SwapError::Transaction {
                chain_id,
                message: format!("receipt lookup for {:?} failed: {}", tx_hash, e),
            })?
            .ok_or_else(|| SwapError::Transaction {
                chain_id,
                message: format!("transaction {:?} dropped from mempool", tx_hash),
            })?;

        Ok(TransactionOutcome {
            chain_id,
            tx_hash,
            success: receipt.status == Some(1.into()),
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
        })
    }
}
