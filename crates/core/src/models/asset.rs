use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::CoreError;

/// A supported cryptocurrency.
///
/// The set is intentionally closed: every analytics payload carries one
/// metrics block per variant. Serialized as its ticker ("BTC", "ETH").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "BTC", alias = "bitcoin")]
    Btc,
    #[serde(rename = "ETH", alias = "ethereum")]
    Eth,
}

impl Asset {
    /// Every supported asset, in display order.
    pub const ALL: [Asset; 2] = [Asset::Btc, Asset::Eth];

    /// Ticker symbol, uppercased (e.g., "BTC").
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
        }
    }

    /// Human-readable name (e.g., "Bitcoin").
    pub fn name(&self) -> &'static str {
        match self {
            Asset::Btc => "Bitcoin",
            Asset::Eth => "Ethereum",
        }
    }

    /// Identifier used by CoinGecko and CoinCap ("bitcoin", "ethereum").
    pub fn coin_id(&self) -> &'static str {
        match self {
            Asset::Btc => "bitcoin",
            Asset::Eth => "ethereum",
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Asset {
    type Err = CoreError;

    /// Accepts tickers or coin ids, case-insensitive ("btc", "Bitcoin", "ETH").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(Asset::Btc),
            "eth" | "ethereum" => Ok(Asset::Eth),
            other => Err(CoreError::ValidationError(format!(
                "Unsupported asset '{other}': expected BTC or ETH"
            ))),
        }
    }
}
