use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::transaction::TransactionKind;

/// Preset look-back windows for the portfolio history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPeriod {
    #[serde(rename = "7d")]
    SevenDays,
    #[default]
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl HistoryPeriod {
    /// Window length in days.
    pub fn days(&self) -> i64 {
        match self {
            HistoryPeriod::SevenDays => 7,
            HistoryPeriod::ThirtyDays => 30,
            HistoryPeriod::NinetyDays => 90,
            HistoryPeriod::SixMonths => 180,
            HistoryPeriod::OneYear => 365,
        }
    }

    /// Sampling interval used with [`Aggregation::Auto`].
    pub fn auto_interval_days(&self) -> i64 {
        match self {
            HistoryPeriod::SevenDays | HistoryPeriod::ThirtyDays => 1,
            HistoryPeriod::NinetyDays => 2,
            HistoryPeriod::SixMonths => 4,
            HistoryPeriod::OneYear => 7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HistoryPeriod::SevenDays => "7 days",
            HistoryPeriod::ThirtyDays => "30 days",
            HistoryPeriod::NinetyDays => "3 months",
            HistoryPeriod::SixMonths => "6 months",
            HistoryPeriod::OneYear => "1 year",
        }
    }
}

impl std::str::FromStr for HistoryPeriod {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "7d" => Ok(HistoryPeriod::SevenDays),
            "30d" => Ok(HistoryPeriod::ThirtyDays),
            "90d" => Ok(HistoryPeriod::NinetyDays),
            "6m" => Ok(HistoryPeriod::SixMonths),
            "1y" => Ok(HistoryPeriod::OneYear),
            other => Err(crate::errors::CoreError::ValidationError(format!(
                "Unknown history period '{other}' (expected 7d, 30d, 90d, 6m or 1y)"
            ))),
        }
    }
}

/// Sampling density of a history series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Interval chosen from the period (denser for short windows)
    #[default]
    Auto,
    Daily,
    Weekly,
    Monthly,
}

impl Aggregation {
    pub fn interval_days(&self, period: HistoryPeriod) -> i64 {
        match self {
            Aggregation::Auto => period.auto_interval_days(),
            Aggregation::Daily => 1,
            Aggregation::Weekly => 7,
            Aggregation::Monthly => 30,
        }
    }
}

/// A trade annotation on a history point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMarker {
    pub kind: TransactionKind,
    pub asset: Asset,
    pub quantity: f64,
    pub value_usd: f64,
}

/// Portfolio state on one sampled date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub total_value: f64,
    pub total_invested: f64,
    pub profit_loss: f64,
    pub roi_percent: f64,
    pub btc_value: f64,
    pub eth_value: f64,
    pub btc_price: f64,
    pub eth_price: f64,
    /// Trades dated after the previous sample and up to this one
    #[serde(default)]
    pub trades: Vec<TradeMarker>,
}

/// A sampled portfolio history with its sampling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioHistory {
    pub interval_days: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub points: Vec<HistoryPoint>,
}

impl PortfolioHistory {
    pub fn data_points(&self) -> usize {
        self.points.len()
    }
}
