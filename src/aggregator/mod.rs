//! Aggregator module - route quotes and cross-chain settlement tracking
//!
//! This module provides:
//! - Typed request/response schemas for the Symbiosis cross-chain API
//! - An HTTP client for `POST /v1/swap` and `GET /v1/tx/{chainId}/{txHash}`
//! - The finality poller that turns status answers into an outcome

pub mod client;
pub mod finality;
pub mod types;

pub use client::{AggregatorClient, QuoteRequest, QuoteSource};
pub use finality::{FinalityOutcome, FinalityPoller, PollSettings, StatusSource};
pub use types::SwapQuote;
