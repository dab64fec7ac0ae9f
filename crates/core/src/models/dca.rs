use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;

/// How often a recurring plan buys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DcaFrequency {
    Daily,
    #[default]
    Weekly,
    /// Every 30 days
    Monthly,
}

impl DcaFrequency {
    pub fn interval_days(&self) -> i64 {
        match self {
            DcaFrequency::Daily => 1,
            DcaFrequency::Weekly => 7,
            DcaFrequency::Monthly => 30,
        }
    }
}

/// One asset's share of a recurring plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaLeg {
    pub asset: Asset,
    /// USD converted into the asset each time this leg runs
    pub usd_amount: f64,
    /// Fee paid on top of `usd_amount`; included in the cost basis
    #[serde(default)]
    pub fee_usd: f64,
    /// Run on every n-th period (1 = every period, 2 = every other period)
    #[serde(default = "default_every")]
    pub every_n_periods: u32,
}

fn default_every() -> u32 {
    1
}

/// A recurring dollar-cost-averaging purchase plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaPlan {
    pub start: NaiveDate,
    pub frequency: DcaFrequency,
    pub legs: Vec<DcaLeg>,
}

impl DcaPlan {
    /// $100 of BTC every week and $50 of ETH every other week, paying
    /// $2.00 and $1.80 in fees respectively.
    pub fn weekly_btc_biweekly_eth(start: NaiveDate) -> Self {
        Self {
            start,
            frequency: DcaFrequency::Weekly,
            legs: vec![
                DcaLeg {
                    asset: Asset::Btc,
                    usd_amount: 100.0,
                    fee_usd: 2.0,
                    every_n_periods: 1,
                },
                DcaLeg {
                    asset: Asset::Eth,
                    usd_amount: 50.0,
                    fee_usd: 1.8,
                    every_n_periods: 2,
                },
            ],
        }
    }
}
