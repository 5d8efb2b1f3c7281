//! HTTP client for the aggregator's swap and transaction-status endpoints

use super::finality::{StatusReport, StatusSource};
use super::types::{SwapQuote, SwapRequestBody, SwapResponse, TokenAmountIn, TokenOut, TxStatus, TxStatusResponse};
use crate::chain::Token;
use crate::config::AggregatorConfig;
use crate::error::{ConfigError, ProtocolError, SwapResult};
use crate::units;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use ethers::utils::to_checksum;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Inputs of a quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub token_in: Token,
    /// Human-readable amount
    pub amount_in: String,
    pub token_out: Token,
    pub from: Address,
    pub to: Address,
    pub slippage_bps: u32,
}

impl QuoteRequest {
    pub fn to_body(&self) -> Result<SwapRequestBody, ConfigError> {
        let amount = units::from_readable(&self.amount_in, self.token_in.decimals).map_err(
            |reason| ConfigError::InvalidAmount {
                amount: self.amount_in.clone(),
                reason,
            },
        )?;

        Ok(SwapRequestBody {
            token_amount_in: TokenAmountIn {
                address: wire_address(&self.token_in),
                chain_id: self.token_in.chain_id,
                decimals: self.token_in.decimals,
                amount: amount.to_string(),
            },
            token_out: TokenOut {
                address: wire_address(&self.token_out),
                chain_id: self.token_out.chain_id,
                decimals: self.token_out.decimals,
            },
            from: to_checksum(&self.from, None),
            to: to_checksum(&self.to, None),
            slippage: self.slippage_bps,
        })
    }
}

/// The aggregator identifies native assets by an empty address
fn wire_address(token: &Token) -> String {
    if token.is_native() {
        String::new()
    } else {
        to_checksum(&token.address, None)
    }
}

/// Source of swap quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn request_swap(&self, request: &QuoteRequest) -> SwapResult<SwapQuote>;
}

/// Symbiosis cross-chain API client
pub struct AggregatorClient {
    http: Client,
    base_url: String,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> SwapResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| ProtocolError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn swap_url(&self) -> String {
        format!("{}/v1/swap", self.base_url)
    }

    fn status_url(&self, chain_id: u64, tx_hash: H256) -> String {
        format!("{}/v1/tx/{}/{:?}", self.base_url, chain_id, tx_hash)
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ProtocolError> {
    let body = response
        .text()
        .await
        .map_err(|source| ProtocolError::Transport {
            url: url.to_string(),
            source,
        })?;

    serde_json::from_str(&body).map_err(|source| ProtocolError::InvalidBody {
        url: url.to_string(),
        source,
    })
}

#[async_trait]
impl QuoteSource for AggregatorClient {
    async fn request_swap(&self, request: &QuoteRequest) -> SwapResult<SwapQuote> {
        let url = self.swap_url();
        let body = request.to_body()?;
        debug!("POST {} {:?}", url, body);

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| ProtocolError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus {
                method: "POST",
                url,
                status,
            }
            .into());
        }

        let parsed: SwapResponse = read_json(&url, response).await?;
        let quote = parsed.into_quote(request.token_in.chain_id)?;

        debug!(
            "Quote: {} {} -> min {} {} (raw), approve to {:?}, estimated {:?}s",
            request.amount_in,
            request.token_in,
            quote.min_amount_out,
            request.token_out,
            quote.approve_to,
            quote.estimated_time
        );
        Ok(quote)
    }
}

#[async_trait]
impl StatusSource for AggregatorClient {
    async fn tx_status(&self, chain_id: u64, tx_hash: H256) -> SwapResult<StatusReport> {
        let url = self.status_url(chain_id, tx_hash);

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ProtocolError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(StatusReport::NotIndexed);
        }
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus {
                method: "GET",
                url,
                status,
            }
            .into());
        }

        let parsed: TxStatusResponse = read_json(&url, response).await?;
        Ok(StatusReport::Indexed(TxStatus::try_from(parsed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::types::FinalityStatus;
    use crate::chain::registry::{self, ETH_MAINNET, MANTLE_MAINNET};
    use crate::error::SwapError;
    use ethers::types::U256;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> AggregatorClient {
        AggregatorClient::new(&AggregatorConfig {
            base_url: server.base_url(),
            ..AggregatorConfig::default()
        })
        .unwrap()
    }

    fn wallet() -> Address {
        "0xf93d011544e89a28b5bdbdd833016cc5f26e82cd".parse().unwrap()
    }

    fn native_request() -> QuoteRequest {
        QuoteRequest {
            token_in: registry::lookup(ETH_MAINNET, "ETH").unwrap(),
            amount_in: "0.05".to_string(),
            token_out: registry::lookup(MANTLE_MAINNET, "WETH").unwrap(),
            from: wallet(),
            to: wallet(),
            slippage_bps: 300,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let request = native_request();
        let body = serde_json::to_value(request.to_body().unwrap()).unwrap();
        let wallet = to_checksum(&wallet(), None);
        assert_eq!(
            body,
            json!({
                "tokenAmountIn": {"address": "", "chainId": 1, "decimals": 18, "amount": "50000000000000000"},
                "tokenOut": {"address": to_checksum(&request.token_out.address, None), "chainId": 5000, "decimals": 18},
                "from": wallet,
                "to": wallet,
                "slippage": 300
            })
        );
    }

    #[tokio::test]
    async fn test_request_swap() {
        let server = MockServer::start_async().await;
        let swap_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/swap")
                    .json_body_partial(r#"{"slippage": 300, "tokenAmountIn": {"chainId": 1, "amount": "50000000000000000"}}"#);
                then.status(200).json_body(json!({
                    "tx": {
                        "chainId": 1,
                        "to": "0xb8f275fBf7A959F4BCE59999A2EF122A099e81A8",
                        "data": "0x01020304",
                        "value": "50000000000000000"
                    },
                    "tokenAmountOutMin": {"chainId": 5000, "decimals": 18, "symbol": "WETH", "amount": "47000000000000000"},
                    "estimatedTime": 600,
                    "approveTo": "0xd99ac0681b904991169a4f398B9043781ADbe0C3"
                }));
            })
            .await;

        let quote = client(&server).request_swap(&native_request()).await.unwrap();

        swap_mock.assert_async().await;
        assert_eq!(quote.tx.value, U256::from(50_000_000_000_000_000u64));
        assert_eq!(quote.min_amount_out, U256::from(47_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_request_swap_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/swap");
                then.status(400).body(r#"{"code":400,"message":"Amount is too low"}"#);
            })
            .await;

        let err = client(&server).request_swap(&native_request()).await.unwrap_err();
        assert!(matches!(
            err,
            SwapError::Protocol(ProtocolError::UnexpectedStatus { status, .. }) if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn test_request_swap_missing_tx() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/swap");
                then.status(200).json_body(json!({"tokenAmountOutMin": {"amount": "1"}}));
            })
            .await;

        let err = client(&server).request_swap(&native_request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Protocol(ProtocolError::MissingField("tx"))));
    }

    #[tokio::test]
    async fn test_request_swap_invalid_json() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/swap");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let err = client(&server).request_swap(&native_request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Protocol(ProtocolError::InvalidBody { .. })));
    }

    #[tokio::test]
    async fn test_tx_status_variants() {
        let server = MockServer::start_async().await;
        let hash_indexed = H256::repeat_byte(0x01);
        let hash_missing = H256::repeat_byte(0x02);
        let hash_broken = H256::repeat_byte(0x03);

        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/tx/1/{:?}", hash_indexed));
                then.status(200).json_body(json!({
                    "status": {"code": 1, "text": "Pending"},
                    "tx": null,
                    "txIn": {"hash": format!("{:?}", hash_indexed), "chainId": 1}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/tx/1/{:?}", hash_missing));
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/tx/1/{:?}", hash_broken));
                then.status(502);
            })
            .await;

        let client = client(&server);

        match client.tx_status(1, hash_indexed).await.unwrap() {
            StatusReport::Indexed(status) => assert_eq!(status.status, FinalityStatus::Pending),
            other => panic!("unexpected report: {:?}", other),
        }
        assert_eq!(
            client.tx_status(1, hash_missing).await.unwrap(),
            StatusReport::NotIndexed
        );
        assert!(matches!(
            client.tx_status(1, hash_broken).await.unwrap_err(),
            SwapError::Protocol(ProtocolError::UnexpectedStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_tx_status_unknown_code() {
        let server = MockServer::start_async().await;
        let hash = H256::repeat_byte(0x04);
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/v1/tx/5000/{:?}", hash));
                then.status(200).json_body(json!({"status": {"code": 42, "text": "?"}}));
            })
            .await;

        let err = client(&server).tx_status(5000, hash).await.unwrap_err();
        assert!(matches!(
            err,
            SwapError::Protocol(ProtocolError::UnknownStatusCode(42))
        ));
    }
}
