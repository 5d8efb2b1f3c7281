//! Wire schema of the Symbiosis cross-chain API and the validated domain
//! types built from it.
//!
//! Request bodies serialize in the API's camelCase. Responses deserialize
//! leniently and are checked once, in `SwapResponse::into_quote` and the
//! `TxStatus` conversion.

use crate::chain::TxRequest;
use crate::error::ProtocolError;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequestBody {
    pub token_amount_in: TokenAmountIn,
    pub token_out: TokenOut,
    pub from: String,
    pub to: String,
    /// Basis points
    pub slippage: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmountIn {
    /// Empty for the native asset
    pub address: String,
    pub chain_id: u64,
    pub decimals: u32,
    /// Smallest units, decimal string
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenOut {
    pub address: String,
    pub chain_id: u64,
    pub decimals: u32,
}

/// Strings and numbers both show up for numeric fields
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{}", n),
            NumberOrString::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub tx: Option<SwapTxPayload>,
    pub token_amount_out: Option<TokenAmountDto>,
    pub token_amount_out_min: Option<TokenAmountDto>,
    pub price_impact: Option<NumberOrString>,
    pub estimated_time: Option<f64>,
    pub approve_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTxPayload {
    pub chain_id: Option<u64>,
    pub to: Option<String>,
    pub data: Option<String>,
    pub value: Option<NumberOrString>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmountDto {
    pub chain_id: Option<u64>,
    pub address: Option<String>,
    pub decimals: Option<u32>,
    pub symbol: Option<String>,
    pub amount: NumberOrString,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatusResponse {
    pub status: StatusDto,
    pub tx: Option<TxDetails>,
    pub tx_in: Option<TxDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDto {
    pub code: i64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDetails {
    pub hash: Option<String>,
    pub chain_id: Option<u64>,
    pub token_amount: Option<TokenAmountDto>,
    pub time: Option<String>,
    pub address: Option<String>,
}

/// Aggregator-reported cross-chain state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FinalityStatus {
    NotFound,
    Success,
    Pending,
    Stuck,
    Reverted,
}

impl FinalityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalityStatus::NotFound => "not_found",
            FinalityStatus::Success => "success",
            FinalityStatus::Pending => "pending",
            FinalityStatus::Stuck => "stuck",
            FinalityStatus::Reverted => "reverted",
        }
    }
}

impl TryFrom<i64> for FinalityStatus {
    type Error = ProtocolError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(FinalityStatus::NotFound),
            0 => Ok(FinalityStatus::Success),
            1 => Ok(FinalityStatus::Pending),
            2 => Ok(FinalityStatus::Stuck),
            3 => Ok(FinalityStatus::Reverted),
            other => Err(ProtocolError::UnknownStatusCode(other)),
        }
    }
}

/// Destination-chain leg as reported by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationTx {
    pub chain_id: u64,
    pub hash: String,
}

/// One validated status answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    pub status: FinalityStatus,
    pub text: String,
    pub destination_tx: Option<DestinationTx>,
}

impl TryFrom<TxStatusResponse> for TxStatus {
    type Error = ProtocolError;

    fn try_from(response: TxStatusResponse) -> Result<Self, Self::Error> {
        let status = FinalityStatus::try_from(response.status.code)?;
        let destination_tx = response.tx.and_then(|tx| match (tx.chain_id, tx.hash) {
            (Some(chain_id), Some(hash)) if !hash.is_empty() => Some(DestinationTx { chain_id, hash }),
            _ => None,
        });
        Ok(Self {
            status,
            text: response.status.text,
            destination_tx,
        })
    }
}

/// Transaction the aggregator wants the wallet to send on the source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapTransaction {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Validated swap route. Read-only once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapQuote {
    pub tx: SwapTransaction,
    pub amount_out: Option<U256>,
    pub min_amount_out: U256,
    /// Seconds
    pub estimated_time: Option<f64>,
    /// Contract the source token must be approved for, if any
    pub approve_to: Option<Address>,
    pub price_impact: Option<String>,
}

impl SwapQuote {
    pub fn tx_request(&self) -> TxRequest {
        TxRequest {
            to: self.tx.to,
            data: self.tx.data.clone(),
            value: self.tx.value,
            kind: "swap",
        }
    }
}

impl SwapResponse {
    /// Validate the response into a quote for `source_chain_id`
    pub fn into_quote(self, source_chain_id: u64) -> Result<SwapQuote, ProtocolError> {
        let tx = self.tx.ok_or(ProtocolError::MissingField("tx"))?;

        let chain_id = tx.chain_id.unwrap_or(source_chain_id);
        if chain_id != source_chain_id {
            return Err(ProtocolError::InvalidField {
                field: "tx.chainId",
                reason: format!("expected chain {}, got {}", source_chain_id, chain_id),
            });
        }

        let to = tx.to.ok_or(ProtocolError::MissingField("tx.to"))?;
        let to = parse_address("tx.to", &to)?;

        let data = tx.data.ok_or(ProtocolError::MissingField("tx.data"))?;
        let data = Bytes::from_str(&data).map_err(|e| ProtocolError::InvalidField {
            field: "tx.data",
            reason: e.to_string(),
        })?;

        let value = match tx.value {
            Some(v) => parse_u256("tx.value", &v.to_string())?,
            None => U256::zero(),
        };

        let min_out = self
            .token_amount_out_min
            .ok_or(ProtocolError::MissingField("tokenAmountOutMin"))?;
        let min_amount_out = parse_u256("tokenAmountOutMin.amount", &min_out.amount.to_string())?;

        let amount_out = self
            .token_amount_out
            .map(|out| parse_u256("tokenAmountOut.amount", &out.amount.to_string()))
            .transpose()?;

        let approve_to = match self.approve_to.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_address("approveTo", raw)?).filter(|a| !a.is_zero()),
        };

        Ok(SwapQuote {
            tx: SwapTransaction {
                chain_id,
                to,
                data,
                value,
            },
            amount_out,
            min_amount_out,
            estimated_time: self.estimated_time,
            approve_to,
            price_impact: self.price_impact.map(|p| p.to_string()),
        })
    }
}

fn parse_address(field: &'static str, raw: &str) -> Result<Address, ProtocolError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| ProtocolError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

/// Accepts decimal or 0x-prefixed hex
fn parse_u256(field: &'static str, raw: &str) -> Result<U256, ProtocolError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(raw).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| ProtocolError::InvalidField { field, reason })
}
