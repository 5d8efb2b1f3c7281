//! Static token registry keyed by (chain, symbol)

use ethers::types::Address;
use serde::Serialize;
use std::fmt;

pub const ETH_MAINNET: u64 = 1;
pub const MANTLE_MAINNET: u64 = 5000;

/// Immutable token descriptor. The zero address denotes the chain's native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub chain_id: u64,
    pub address: Address,
    pub decimals: u32,
    pub symbol: &'static str,
}

impl Token {
    pub fn is_native(&self) -> bool {
        self.address.is_zero()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", chain_name(self.chain_id), self.symbol)
    }
}

struct TokenEntry {
    chain_id: u64,
    symbol: &'static str,
    address: &'static str,
    decimals: u32,
}

const TOKENS: &[TokenEntry] = &[
    TokenEntry {
        chain_id: ETH_MAINNET,
        symbol: "ETH",
        address: "0x0000000000000000000000000000000000000000",
        decimals: 18,
    },
    TokenEntry {
        chain_id: ETH_MAINNET,
        symbol: "USDC",
        address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
        decimals: 6,
    },
    TokenEntry {
        chain_id: MANTLE_MAINNET,
        symbol: "MNT",
        address: "0x0000000000000000000000000000000000000000",
        decimals: 18,
    },
    TokenEntry {
        chain_id: MANTLE_MAINNET,
        symbol: "USDC",
        address: "0x09Bc4E0D864854c6aFB6eB9A9cdF58aC190D0dF9",
        decimals: 6,
    },
    TokenEntry {
        chain_id: MANTLE_MAINNET,
        symbol: "WETH",
        address: "0xdEAddEaDdeadDEadDEADDEAddEADDEAddead1111",
        decimals: 18,
    },
];

/// Look up a token by chain and symbol (case-insensitive)
pub fn lookup(chain_id: u64, symbol: &str) -> Option<Token> {
    TOKENS
        .iter()
        .find(|t| t.chain_id == chain_id && t.symbol.eq_ignore_ascii_case(symbol))
        .and_then(|t| {
            let address = t.address.parse::<Address>().ok()?;
            Some(Token {
                chain_id: t.chain_id,
                address,
                decimals: t.decimals,
                symbol: t.symbol,
            })
        })
}

/// Human-readable chain name
pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        ETH_MAINNET => "Ethereum".to_string(),
        MANTLE_MAINNET => "Mantle".to_string(),
        other => format!("chain {}", other),
    }
}
