//! Static per-chain gas parameters

use crate::config::ChainConfig;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Eip1559TransactionRequest, TransactionRequest, U256};

use crate::chain::TxRequest;

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// Gas settings taken verbatim from configuration. No estimation is done:
/// the limit is fixed and fees are capped by the configured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: U256,
    /// `None` means a legacy transaction priced at the node's gas price
    pub fixed_price: Option<GasPrice>,
}

impl GasPolicy {
    pub fn from_chain_config(config: &ChainConfig) -> Self {
        let fixed_price = config.max_fee_per_gas_wei.map(|max_fee| GasPrice::Eip1559 {
            max_fee_per_gas: U256::from(max_fee),
            // priority fee is not recommended on some L2s (Mantle), so it defaults to zero
            max_priority_fee_per_gas: U256::from(config.max_priority_fee_per_gas_wei.unwrap_or(0)),
        });

        Self {
            gas_limit: U256::from(config.gas_limit),
            fixed_price,
        }
    }

    /// Calculate worst-case cost in wei
    pub fn max_cost(&self, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => self.gas_limit * *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => self.gas_limit * *max_fee_per_gas,
        }
    }
}

/// Build the unsigned transaction for a request
pub fn build_typed_tx(
    request: &TxRequest,
    chain_id: u64,
    nonce: U256,
    gas_limit: U256,
    gas_price: &GasPrice,
) -> TypedTransaction {
    match gas_price {
        GasPrice::Legacy(price) => TransactionRequest::new()
            .to(request.to)
            .data(request.data.clone())
            .value(request.value)
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(*price)
            .chain_id(chain_id)
            .into(),
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .to(request.to)
            .data(request.data.clone())
            .value(request.value)
            .nonce(nonce)
            .gas(gas_limit)
            .max_fee_per_gas(*max_fee_per_gas)
            .max_priority_fee_per_gas(*max_priority_fee_per_gas)
            .chain_id(chain_id)
            .into(),
    }
}
