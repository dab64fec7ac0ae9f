use serde::{Deserialize, Serialize};

use super::holding::CostBasisMethod;

/// Default annual risk-free rate used by the Sharpe ratio (2%).
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Default maximum age of a fallback quote, in days.
pub const DEFAULT_STALE_PRICE_MAX_AGE_DAYS: i64 = 7;

/// Upper bound for the fallback-quote age (ten years).
pub const MAX_STALE_PRICE_MAX_AGE_DAYS: i64 = 3_650;

/// User-configurable settings, stored inside the ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Optional CoinGecko API key (demo or pro). Without one the public,
    /// rate-limited endpoints are used.
    #[serde(default)]
    pub coingecko_api_key: Option<String>,

    /// Annual risk-free rate as a fraction (0.02 = 2%), for the Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// How many days old a remembered quote may be and still be served as
    /// a stale fallback when every provider fails.
    #[serde(default = "default_stale_price_max_age_days")]
    pub stale_price_max_age_days: i64,

    /// Cost-basis accounting for sells.
    #[serde(default)]
    pub cost_basis_method: CostBasisMethod,
}

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

fn default_stale_price_max_age_days() -> i64 {
    DEFAULT_STALE_PRICE_MAX_AGE_DAYS
}

impl Settings {
    /// Clamp values read from a hand-edited file into their valid ranges.
    pub fn sanitize(&mut self) {
        self.stale_price_max_age_days = self
            .stale_price_max_age_days
            .clamp(0, MAX_STALE_PRICE_MAX_AGE_DAYS);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coingecko_api_key: None,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            stale_price_max_age_days: DEFAULT_STALE_PRICE_MAX_AGE_DAYS,
            cost_basis_method: CostBasisMethod::WeightedAverage,
        }
    }
}
