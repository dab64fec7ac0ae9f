use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::price::PriceFreshness;

/// Value and profit/loss of one held asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetValuation {
    pub asset: Asset,

    /// Units held
    pub quantity_held: f64,

    /// Weighted-average cost per unit (0 when nothing is held)
    pub avg_purchase_price_usd: f64,

    /// Market price used for this valuation
    pub current_price_usd: f64,

    /// `quantity_held × current_price_usd`
    pub current_value_usd: f64,

    /// Remaining cost basis
    pub total_invested_usd: f64,

    /// `current_value_usd − total_invested_usd`
    pub profit_loss_usd: f64,

    /// `profit_loss_usd / total_invested_usd × 100` (0 when nothing invested)
    pub roi_percent: f64,
}

/// Portfolio valuation at a point in time: per-asset rows plus totals.
///
/// Aggregate ROI is derived from the aggregate P/L and aggregate invested
/// amount, never averaged across assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    /// Date this snapshot was computed for
    pub as_of: NaiveDate,

    /// One row per asset with a positive quantity, in `Asset::ALL` order
    pub assets: Vec<AssetValuation>,

    pub total_invested_usd: f64,
    pub current_value_usd: f64,
    pub profit_loss_usd: f64,
    pub roi_percent: f64,

    /// `Stale` when at least one price came from the fallback cache
    pub price_freshness: PriceFreshness,
}

impl ValuationSnapshot {
    /// Row for `asset`, if it is held.
    pub fn asset(&self, asset: Asset) -> Option<&AssetValuation> {
        self.assets.iter().find(|a| a.asset == asset)
    }
}
