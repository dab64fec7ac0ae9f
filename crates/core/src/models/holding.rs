use serde::{Deserialize, Serialize};

use super::asset::Asset;
use crate::math::safe_div;

/// How a sell removes cost from the running basis.
///
/// Only the weighted-average method is implemented; lot-matching methods
/// (FIFO/LIFO) would change `avg_purchase_price_usd` after partial sells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostBasisMethod {
    /// Each sell removes a pro-rata share of the invested amount.
    #[default]
    WeightedAverage,
}

/// Derived position in one asset at a cutoff date.
///
/// Never persisted: always recomputed from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: Asset,

    /// Units currently held (never negative)
    pub quantity_held: f64,

    /// Remaining cost basis in USD
    pub total_invested_usd: f64,

    /// Units ever bought
    pub total_bought: f64,

    /// Units ever sold
    pub total_sold: f64,

    /// Gross USD ever spent on buys (not reduced by sells)
    pub gross_invested_usd: f64,

    /// Gross USD ever received from sells
    pub total_received_usd: f64,

    /// Sell proceeds minus the cost basis those sells removed
    pub realized_profit_loss_usd: f64,
}

impl Holding {
    pub fn empty(asset: Asset) -> Self {
        Self {
            asset,
            quantity_held: 0.0,
            total_invested_usd: 0.0,
            total_bought: 0.0,
            total_sold: 0.0,
            gross_invested_usd: 0.0,
            total_received_usd: 0.0,
            realized_profit_loss_usd: 0.0,
        }
    }

    /// `total_invested_usd / quantity_held`; `0.0` when nothing is held.
    pub fn avg_purchase_price_usd(&self) -> f64 {
        if self.quantity_held > 0.0 {
            safe_div(self.total_invested_usd, self.quantity_held)
        } else {
            0.0
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity_held > 0.0
    }
}
