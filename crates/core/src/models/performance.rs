use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::price::PriceFreshness;

/// Whole-portfolio return figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalMetrics {
    pub total_invested_usd: f64,
    pub current_value_usd: f64,
    pub profit_loss_usd: f64,
    pub roi_percent: f64,
    /// Compounded yearly return. Reported as 0 when compounding overflows
    /// (a large gain over a few days), never as infinity.
    pub annualized_return_percent: f64,
    /// Days from the first transaction to the evaluation date (0 for an empty ledger)
    pub days_invested: i64,
}

/// Return figures and allocation for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetrics {
    pub asset: Asset,
    pub total_invested_usd: f64,
    pub current_value_usd: f64,
    pub profit_loss_usd: f64,
    pub roi_percent: f64,
    /// Annualized over the days since this asset's first transaction;
    /// 0 when compounding overflows
    pub annualized_return_percent: f64,
    /// Share of total portfolio value, in percent
    pub allocation_percent: f64,
    pub avg_purchase_price_usd: f64,
    pub current_price_usd: f64,
    pub quantity_held: f64,
}

impl AssetMetrics {
    pub fn zero(asset: Asset) -> Self {
        Self {
            asset,
            total_invested_usd: 0.0,
            current_value_usd: 0.0,
            profit_loss_usd: 0.0,
            roi_percent: 0.0,
            annualized_return_percent: 0.0,
            allocation_percent: 0.0,
            avg_purchase_price_usd: 0.0,
            current_price_usd: 0.0,
            quantity_held: 0.0,
        }
    }
}

/// Periodic investing compared with one purchase on the first ledger date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaAnalysis {
    /// Actual ROI minus lump-sum ROI, in percentage points (positive = DCA won)
    pub dca_vs_lump_sum_percent: f64,
    /// Value today of the hypothetical lump-sum purchase
    pub lump_sum_value_usd: f64,
    pub lump_sum_roi_percent: f64,
    pub weekly_avg_investment: f64,
    pub total_weeks_invested: i64,
}

/// A dated week-over-week return. `date` is `None` when no interval exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    pub date: Option<NaiveDate>,
    pub return_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformancePeriods {
    pub best_week: PeriodReturn,
    pub worst_week: PeriodReturn,
}

/// The performance-metrics payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub as_of: NaiveDate,
    pub total_metrics: TotalMetrics,
    pub btc_metrics: AssetMetrics,
    pub eth_metrics: AssetMetrics,
    pub dca_analysis: DcaAnalysis,
    pub performance_periods: PerformancePeriods,
    /// `Stale` when any current price came from the fallback cache
    #[serde(default)]
    pub price_freshness: PriceFreshness,
}

impl PerformanceMetrics {
    pub fn asset_metrics(&self, asset: Asset) -> &AssetMetrics {
        match asset {
            Asset::Btc => &self.btc_metrics,
            Asset::Eth => &self.eth_metrics,
        }
    }
}

/// Total portfolio value on one sampled date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}
