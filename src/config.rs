//! Configuration management for the swapper
//!
//! Loads configuration from a TOML file with environment variable substitution,
//! validates it eagerly and produces the immutable [`SessionConfig`] that is
//! handed to every component of a swap session.

use crate::chain::registry::{self, Token};
use crate::error::ConfigError;
use crate::units;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

// A day is far beyond any relay time the aggregator reports
const MAX_POLL_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub allowance: AllowanceConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
}

/// Swap parameters. The optional fields are required; they are checked in
/// [`Settings::into_session`] so each missing one gets its own error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwapConfig {
    pub source_chain_id: Option<u64>,
    pub destination_chain_id: Option<u64>,
    /// Human-readable amount of the source token, e.g. "0.05"
    pub amount_in: Option<String>,
    pub source_token: Option<String>,
    pub destination_token: Option<String>,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Defaults to the wallet address
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub treat_reverted_as_terminal: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowanceConfig {
    #[serde(default)]
    pub on_query_unavailable: AllowanceFallback,
}

/// What to do when a token contract cannot answer `allowance(owner, spender)`
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceFallback {
    /// Treat the token as needing no approval
    #[default]
    AssumeSufficient,
    /// Send an approval anyway
    Approve,
    /// Stop the session
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text file written when the session ends
    pub textfile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    pub gas_limit: u64,
    pub max_fee_per_gas_wei: Option<u64>,
    pub max_priority_fee_per_gas_wei: Option<u64>,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

fn default_slippage_bps() -> u32 {
    300
}

fn default_base_url() -> String {
    "https://api.symbiosis.finance/crosschain".to_string()
}

// Symbiosis takes around ten minutes to publish the destination leg
fn default_max_polls() -> u32 {
    15
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

fn default_confirmations() -> usize {
    1
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_polls: default_max_polls(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            treat_reverted_as_terminal: false,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl AggregatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest time the finality poller may spend waiting
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval().saturating_mul(self.max_polls)
    }
}

/// Validated, immutable inputs of one swap session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub source_token: Token,
    pub destination_token: Token,
    pub amount_in: String,
    pub amount_in_raw: U256,
    pub slippage_bps: u32,
    pub wallet: LocalWallet,
    pub recipient: Address,
    pub source_chain: ChainConfig,
    pub destination_chain: ChainConfig,
    pub aggregator: AggregatorConfig,
    pub allowance_fallback: AllowanceFallback,
    pub metrics: MetricsConfig,
}

impl SessionConfig {
    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }
}

impl Settings {
    /// Load settings from the configuration file named by `SWAPPER_CONFIG`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var("SWAPPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config_str = substitute_env_vars(input);
        Ok(toml::from_str(&config_str)?)
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Validate everything and build the session configuration
    pub fn into_session(self) -> Result<SessionConfig, ConfigError> {
        let swap = &self.swap;
        let source_chain_id = required("swap.source_chain_id", swap.source_chain_id)?;
        let destination_chain_id =
            required("swap.destination_chain_id", swap.destination_chain_id)?;
        let amount_in = required_text("swap.amount_in", &swap.amount_in)?;
        let source_symbol = required_text("swap.source_token", &swap.source_token)?;
        let destination_symbol = required_text("swap.destination_token", &swap.destination_token)?;

        if source_chain_id == destination_chain_id {
            return Err(ConfigError::SameChain(source_chain_id));
        }

        let source_chain = self.checked_chain(source_chain_id)?;
        let destination_chain = self.checked_chain(destination_chain_id)?;

        let source_token = resolve_token(source_chain_id, source_symbol)?;
        let destination_token = resolve_token(destination_chain_id, destination_symbol)?;

        let amount_in_raw = units::from_readable(amount_in, source_token.decimals).map_err(
            |reason| ConfigError::InvalidAmount {
                amount: amount_in.to_string(),
                reason,
            },
        )?;
        if amount_in_raw.is_zero() {
            return Err(ConfigError::InvalidAmount {
                amount: amount_in.to_string(),
                reason: "amount must be greater than zero".to_string(),
            });
        }

        if swap.slippage_bps == 0 || swap.slippage_bps > 10_000 {
            return Err(ConfigError::InvalidSlippage(swap.slippage_bps));
        }

        let key = env::var(&self.wallet.private_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingPrivateKey(self.wallet.private_key_env.clone()))?;
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?
            .with_chain_id(source_chain_id);

        let recipient = match &swap.recipient {
            Some(r) if !r.trim().is_empty() => r
                .trim()
                .parse::<Address>()
                .map_err(|_| ConfigError::InvalidRecipient(r.clone()))?,
            _ => wallet.address(),
        };

        let base_url = self.aggregator.base_url.trim_end_matches('/').to_string();
        match reqwest::Url::parse(&base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: base_url.clone(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidBaseUrl {
                    url: base_url.clone(),
                    reason: e.to_string(),
                })
            }
        }
        if self.aggregator.max_polls == 0 {
            return Err(ConfigError::InvalidMaxPolls);
        }
        if self.aggregator.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        let budget = Duration::from_millis(self.aggregator.poll_interval_ms)
            .checked_mul(self.aggregator.max_polls);
        if budget.map_or(true, |b| b > MAX_POLL_BUDGET) {
            return Err(ConfigError::PollBudgetTooLarge {
                max_polls: self.aggregator.max_polls,
                poll_interval_ms: self.aggregator.poll_interval_ms,
            });
        }

        let amount_in = amount_in.to_string();
        let slippage_bps = swap.slippage_bps;
        Ok(SessionConfig {
            source_token,
            destination_token,
            amount_in,
            amount_in_raw,
            slippage_bps,
            wallet,
            recipient,
            source_chain,
            destination_chain,
            aggregator: AggregatorConfig {
                base_url,
                ..self.aggregator
            },
            allowance_fallback: self.allowance.on_query_unavailable,
            metrics: self.metrics,
        })
    }

    fn checked_chain(&self, chain_id: u64) -> Result<ChainConfig, ConfigError> {
        let chain = self
            .get_chain_by_id(chain_id)
            .ok_or(ConfigError::UnknownChain(chain_id))?;
        if chain.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            return Err(ConfigError::MissingRpcUrls {
                chain: chain.name.clone(),
            });
        }
        Ok(chain.clone())
    }
}

fn required<T: Copy>(field: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingField(field))
}

fn required_text<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField(field))
}

fn resolve_token(chain_id: u64, symbol: &str) -> Result<Token, ConfigError> {
    registry::lookup(chain_id, symbol).ok_or_else(|| ConfigError::UnknownToken {
        chain: registry::chain_name(chain_id),
        symbol: symbol.to_string(),
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    // anvil's first dev account
    pub(crate) const TEST_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    pub(crate) fn sample_toml(key_env: &str) -> String {
        format!(
            r#"
[swap]
source_chain_id = 1
destination_chain_id = 5000
amount_in = "0.05"
source_token = "ETH"
destination_token = "WETH"
slippage_bps = 300

[aggregator]
base_url = "https://api.symbiosis.finance/crosschain/"
max_polls = 3
poll_interval_ms = 1000

[wallet]
private_key_env = "{key_env}"

[chains.ethereum]
chain_id = 1
name = "Ethereum"
rpc_urls = ["http://localhost:8545"]
gas_limit = 500000
max_fee_per_gas_wei = 20000000000
max_priority_fee_per_gas_wei = 20000000000

[chains.mantle]
chain_id = 5000
name = "Mantle"
rpc_urls = ["http://localhost:9545"]
gas_limit = 2000000000
max_fee_per_gas_wei = 50000000
"#
        )
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("SWAPPER_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${SWAPPER_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_session_from_file() {
        env::set_var("SWAPPER_TEST_KEY_FILE", TEST_KEY);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml("SWAPPER_TEST_KEY_FILE").as_bytes())
            .unwrap();

        let session = Settings::load_from(file.path())
            .unwrap()
            .into_session()
            .unwrap();

        assert!(session.source_token.is_native());
        assert_eq!(session.destination_token.symbol, "WETH");
        assert_eq!(
            session.amount_in_raw,
            U256::from(50_000_000_000_000_000u64)
        );
        assert_eq!(session.recipient, session.wallet_address());
        assert_eq!(
            session.aggregator.base_url,
            "https://api.symbiosis.finance/crosschain"
        );
        assert_eq!(session.aggregator.poll_budget(), Duration::from_secs(3));
        assert_eq!(session.allowance_fallback, AllowanceFallback::AssumeSufficient);
        assert_eq!(session.wallet.chain_id(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load_from(std::path::Path::new("/nonexistent/swapper.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_each_missing_swap_field_is_named() {
        env::set_var("SWAPPER_TEST_KEY_REQUIRED", TEST_KEY);
        let base = sample_toml("SWAPPER_TEST_KEY_REQUIRED");

        for (line, field) in [
            ("source_chain_id = 1\n", "swap.source_chain_id"),
            ("destination_chain_id = 5000\n", "swap.destination_chain_id"),
            ("amount_in = \"0.05\"\n", "swap.amount_in"),
            ("source_token = \"ETH\"\n", "swap.source_token"),
            ("destination_token = \"WETH\"\n", "swap.destination_token"),
        ] {
            let toml = base.replace(line, "");
            let err = Settings::from_toml(&toml).unwrap().into_session().unwrap_err();
            match err {
                ConfigError::MissingField(missing) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other}"),
            }
        }

        let blank = base.replace("amount_in = \"0.05\"", "amount_in = \"  \"");
        assert!(matches!(
            Settings::from_toml(&blank).unwrap().into_session(),
            Err(ConfigError::MissingField("swap.amount_in"))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let toml = sample_toml("UNUSED").replace("amount_in = \"0.05\"", "amount_in = 0.05.1");
        assert!(matches!(
            Settings::from_toml(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_poll_budget_is_bounded() {
        env::set_var("SWAPPER_TEST_KEY_BUDGET", TEST_KEY);
        let base = sample_toml("SWAPPER_TEST_KEY_BUDGET");

        let overflowing = base
            .replace("max_polls = 3", "max_polls = 4294967295")
            .replace("poll_interval_ms = 1000", "poll_interval_ms = 9223372036854775807");
        assert!(matches!(
            Settings::from_toml(&overflowing).unwrap().into_session(),
            Err(ConfigError::PollBudgetTooLarge { .. })
        ));

        let two_days = base.replace("max_polls = 3", "max_polls = 2880");
        let two_days = two_days.replace("poll_interval_ms = 1000", "poll_interval_ms = 60000");
        assert!(matches!(
            Settings::from_toml(&two_days).unwrap().into_session(),
            Err(ConfigError::PollBudgetTooLarge { max_polls: 2880, .. })
        ));

        let settings = Settings::from_toml(&base).unwrap();
        let huge = AggregatorConfig {
            max_polls: u32::MAX,
            poll_interval_ms: u64::MAX,
            ..settings.aggregator
        };
        assert_eq!(huge.poll_budget(), Duration::MAX);
    }

    #[test]
    fn test_distinct_validation_errors() {
        env::set_var("SWAPPER_TEST_KEY_VALIDATE", TEST_KEY);
        let base = sample_toml("SWAPPER_TEST_KEY_VALIDATE");

        let unknown_token = base.replace("destination_token = \"WETH\"", "destination_token = \"DOGE\"");
        assert!(matches!(
            Settings::from_toml(&unknown_token).unwrap().into_session(),
            Err(ConfigError::UnknownToken { .. })
        ));

        let bad_amount = base.replace("amount_in = \"0.05\"", "amount_in = \"0.o5\"");
        assert!(matches!(
            Settings::from_toml(&bad_amount).unwrap().into_session(),
            Err(ConfigError::InvalidAmount { .. })
        ));

        let zero_amount = base.replace("amount_in = \"0.05\"", "amount_in = \"0\"");
        assert!(matches!(
            Settings::from_toml(&zero_amount).unwrap().into_session(),
            Err(ConfigError::InvalidAmount { .. })
        ));

        let bad_slippage = base.replace("slippage_bps = 300", "slippage_bps = 20000");
        assert!(matches!(
            Settings::from_toml(&bad_slippage).unwrap().into_session(),
            Err(ConfigError::InvalidSlippage(20000))
        ));

        let unknown_chain = base.replace("destination_chain_id = 5000", "destination_chain_id = 10");
        assert!(matches!(
            Settings::from_toml(&unknown_chain).unwrap().into_session(),
            Err(ConfigError::UnknownChain(10))
        ));

        let zero_polls = base.replace("max_polls = 3", "max_polls = 0");
        assert!(matches!(
            Settings::from_toml(&zero_polls).unwrap().into_session(),
            Err(ConfigError::InvalidMaxPolls)
        ));

        let zero_interval = base.replace("poll_interval_ms = 1000", "poll_interval_ms = 0");
        assert!(matches!(
            Settings::from_toml(&zero_interval).unwrap().into_session(),
            Err(ConfigError::InvalidPollInterval)
        ));

        let bad_url = base.replace(
            "https://api.symbiosis.finance/crosschain/",
            "ftp://api.symbiosis.finance",
        );
        assert!(matches!(
            Settings::from_toml(&bad_url).unwrap().into_session(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_missing_private_key() {
        let toml = sample_toml("SWAPPER_TEST_KEY_THAT_IS_NEVER_SET");
        assert!(matches!(
            Settings::from_toml(&toml).unwrap().into_session(),
            Err(ConfigError::MissingPrivateKey(_))
        ));

        env::set_var("SWAPPER_TEST_KEY_GARBAGE", "not-a-key");
        let toml = sample_toml("SWAPPER_TEST_KEY_GARBAGE");
        assert!(matches!(
            Settings::from_toml(&toml).unwrap().into_session(),
            Err(ConfigError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_explicit_recipient_and_fallback_policy() {
        env::set_var("SWAPPER_TEST_KEY_RECIPIENT", TEST_KEY);
        let toml = sample_toml("SWAPPER_TEST_KEY_RECIPIENT")
            .replace(
                "slippage_bps = 300",
                "slippage_bps = 300\nrecipient = \"0xf93d011544e89a28b5bdbdd833016cc5f26e82cd\"",
            )
            .replace(
                "[wallet]",
                "[allowance]\non_query_unavailable = \"abort\"\n\n[wallet]",
            );

        let session = Settings::from_toml(&toml).unwrap().into_session().unwrap();
        assert_eq!(
            session.recipient,
            "0xf93d011544e89a28b5bdbdd833016cc5f26e82cd"
                .parse::<Address>()
                .unwrap()
        );
        assert_ne!(session.recipient, session.wallet_address());
        assert_eq!(session.allowance_fallback, AllowanceFallback::Abort);
    }
}
