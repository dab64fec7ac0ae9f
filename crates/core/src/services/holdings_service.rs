use chrono::NaiveDate;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::math::safe_div;
use crate::models::asset::Asset;
use crate::models::holding::{CostBasisMethod, Holding};
use crate::models::transaction::{Transaction, TransactionKind};

/// Quantities below this are treated as zero (float dust after sells).
pub const QUANTITY_EPSILON: f64 = 1e-10;

/// Running fold of transactions into per-asset holdings.
///
/// Feed transactions in ascending date order. Used directly by the series
/// computations, which advance one accumulator across many sample dates
/// instead of refolding the ledger for every date.
#[derive(Debug, Clone)]
pub struct HoldingsAccumulator {
    method: CostBasisMethod,
    holdings: HashMap<Asset, Holding>,
}

impl HoldingsAccumulator {
    pub fn new(method: CostBasisMethod) -> Self {
        Self {
            method,
            holdings: HashMap::new(),
        }
    }

    /// Apply one transaction.
    ///
    /// Errors on malformed records and on sells larger than the quantity
    /// held; on error the accumulator is left unchanged.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), CoreError> {
        tx.validate()?;

        let holding = self
            .holdings
            .entry(tx.asset)
            .or_insert_with(|| Holding::empty(tx.asset));

        match tx.kind {
            TransactionKind::Buy => {
                let cost = tx.value_usd();
                holding.quantity_held += tx.quantity;
                holding.total_invested_usd += cost;
                holding.total_bought += tx.quantity;
                holding.gross_invested_usd += cost;
            }
            TransactionKind::Sell => {
                let available = holding.quantity_held;
                if tx.quantity > available + QUANTITY_EPSILON {
                    return Err(CoreError::Overdraft {
                        asset: tx.asset.symbol().to_string(),
                        requested: tx.quantity,
                        available,
                        date: tx.date.to_string(),
                    });
                }

                let sold = tx.quantity.min(available);
                let removed_cost = match self.method {
                    CostBasisMethod::WeightedAverage => {
                        holding.total_invested_usd * safe_div(sold, available)
                    }
                };
                let proceeds = sold * tx.unit_price_usd;

                holding.total_invested_usd -= removed_cost;
                holding.quantity_held = (available - sold).max(0.0);
                holding.total_sold += sold;
                holding.total_received_usd += proceeds;
                holding.realized_profit_loss_usd += proceeds - removed_cost;

                if holding.quantity_held < QUANTITY_EPSILON {
                    holding.quantity_held = 0.0;
                    holding.total_invested_usd = 0.0;
                }
            }
        }
        Ok(())
    }

    /// Current holding for `asset`, if it has been traded.
    pub fn holding(&self, asset: Asset) -> Option<&Holding> {
        self.holdings.get(&asset)
    }

    /// Units of `asset` currently held (0 if never traded).
    pub fn quantity(&self, asset: Asset) -> f64 {
        self.holdings.get(&asset).map_or(0.0, |h| h.quantity_held)
    }

    pub fn holdings(&self) -> &HashMap<Asset, Holding> {
        &self.holdings
    }

    pub fn into_holdings(self) -> HashMap<Asset, Holding> {
        self.holdings
    }
}

/// Folds the ledger into holdings and weighted-average cost basis.
///
/// Pure business logic: no I/O, no prices.
#[derive(Debug, Clone, Default)]
pub struct HoldingsCalculator {
    method: CostBasisMethod,
}

impl HoldingsCalculator {
    pub fn new(method: CostBasisMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> CostBasisMethod {
        self.method
    }

    pub fn accumulator(&self) -> HoldingsAccumulator {
        HoldingsAccumulator::new(self.method)
    }

    /// Holdings per asset from every transaction dated on or before `as_of`.
    ///
    /// Input order does not matter: transactions are processed by ascending
    /// date, same-day records in the order given. Assets whose position has
    /// been fully sold stay in the map with `quantity_held == 0` so their
    /// realized P/L remains visible.
    pub fn compute_holdings(
        &self,
        transactions: &[Transaction],
        as_of: NaiveDate,
    ) -> Result<HashMap<Asset, Holding>, CoreError> {
        let mut acc = self.accumulator();
        for tx in sorted_until(transactions, as_of) {
            acc.apply(tx)?;
        }
        Ok(acc.into_holdings())
    }
}

/// Transactions dated on or before `as_of`, sorted by date (stable).
pub fn sorted_until(transactions: &[Transaction], as_of: NaiveDate) -> Vec<&Transaction> {
    let mut txs: Vec<&Transaction> = transactions.iter().filter(|t| t.date <= as_of).collect();
    txs.sort_by_key(|t| t.date);
    txs
}
