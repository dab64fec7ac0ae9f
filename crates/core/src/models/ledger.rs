use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::price::PriceCache;
use super::settings::Settings;
use super::transaction::Transaction;

/// The persisted data container: everything in here is written to the
/// portable ledger file.
///
/// Contains the append-only transaction log (kept sorted by date, same-day
/// records in insertion order), settings, and the price cache so that
/// historical prices survive restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    /// All buy/sell transactions, oldest first
    pub transactions: Vec<Transaction>,

    /// User settings (API key, risk-free rate, ...)
    #[serde(default)]
    pub settings: Settings,

    /// Cached daily prices and the last live quotes
    #[serde(default)]
    pub price_cache: PriceCache,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Date of the earliest transaction, if any.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.transactions.first().map(|t| t.date)
    }

    /// Date of the most recent transaction, if any.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.transactions.last().map(|t| t.date)
    }

    /// Transactions for a single asset, oldest first.
    pub fn for_asset(&self, asset: Asset) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(move |t| t.asset == asset)
    }

    /// Assets that appear anywhere in the ledger, in `Asset::ALL` order.
    pub fn assets(&self) -> Vec<Asset> {
        Asset::ALL
            .into_iter()
            .filter(|a| self.transactions.iter().any(|t| t.asset == *a))
            .collect()
    }
}
