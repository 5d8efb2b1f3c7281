//! Error types for the swapper

use crate::aggregator::FinalityOutcome;

use ethers::types::H256;
use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for a swap session
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Aggregator protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Transaction error on chain {chain_id}: {message}")]
    Transaction { chain_id: u64, message: String },

    #[error("Transaction {tx_hash:?} on chain {chain_id} was included but failed")]
    ChainTxFailure { chain_id: u64, tx_hash: H256 },

    #[error(
        "Cross-chain completion of {tx_hash:?} (chain {chain_id}) not confirmed: {outcome}; funds may be in transit"
    )]
    FinalityTimeout {
        chain_id: u64,
        tx_hash: H256,
        outcome: FinalityOutcome,
    },

    #[error(
        "Settlement of swap {tx_hash:?} (chain {chain_id}) could not be tracked: {source}; funds may be in transit"
    )]
    SettlementUntracked {
        chain_id: u64,
        tx_hash: H256,
        #[source]
        source: Box<SwapError>,
    },

    #[error("Allowance query unavailable for token {token} on chain {chain_id}")]
    AllowanceUnavailable { chain_id: u64, token: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cancelled while {operation}")]
    Cancelled { operation: String },
}

impl SwapError {
    /// Whether funds may already be in flight, so the operator has to track
    /// the swap by hand instead of re-running the session.
    pub fn requires_manual_followup(&self) -> bool {
        matches!(
            self,
            SwapError::FinalityTimeout { .. }
                | SwapError::SettlementUntracked { .. }
                | SwapError::Cancelled { .. }
        )
    }

    /// Transaction hash worth inspecting for this failure, if any
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            SwapError::ChainTxFailure { tx_hash, .. }
            | SwapError::FinalityTimeout { tx_hash, .. }
            | SwapError::SettlementUntracked { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Startup configuration failures. Each one aborts before any network call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Chain {0} is not configured")]
    UnknownChain(u64),

    #[error("Chain {chain} has no RPC URLs configured")]
    MissingRpcUrls { chain: String },

    #[error("{chain} {symbol} is not available")]
    UnknownToken { chain: String, symbol: String },

    #[error("Invalid swap amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Slippage tolerance must be between 1 and 10000 bps, got {0}")]
    InvalidSlippage(u32),

    #[error("Source and destination chain must differ (both {0})")]
    SameChain(u64),

    #[error("Invalid recipient address {0:?}")]
    InvalidRecipient(String),

    #[error("Private key environment variable {0} is not set")]
    MissingPrivateKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid aggregator base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("max_polls must be greater than zero")]
    InvalidMaxPolls,

    #[error("poll_interval_ms must be greater than zero")]
    InvalidPollInterval,

    #[error("max_polls {max_polls} x poll_interval_ms {poll_interval_ms} exceeds one day")]
    PollBudgetTooLarge { max_polls: u32, poll_interval_ms: u64 },
}

/// Malformed or error responses from the aggregator
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned status {status}")]
    UnexpectedStatus {
        method: &'static str,
        url: String,
        status: StatusCode,
    },

    #[error("Unparseable response from {url}: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Response field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unknown transaction status code {0}")]
    UnknownStatusCode(i64),
}

/// Result type for swap operations
pub type SwapResult<T> = Result<T, SwapError>;
