use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::Asset;
use crate::errors::CoreError;

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Acquiring an asset
    Buy,
    /// Disposing of an asset
    Sell,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Buy => write!(f, "buy"),
            TransactionKind::Sell => write!(f, "sell"),
        }
    }
}

/// A single buy/sell record in the ledger.
///
/// Unlike market prices, the execution price is part of the record: cost
/// basis is always computed from what was actually paid or received.
/// Transactions are immutable once they enter the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: Uuid,

    /// The asset involved
    pub asset: Asset,

    /// Buy or Sell
    pub kind: TransactionKind,

    /// Units of the asset (always positive)
    pub quantity: f64,

    /// USD paid (buy) or received (sell) per unit, fees included
    pub unit_price_usd: f64,

    /// Trade date (daily granularity)
    pub date: NaiveDate,

    /// Optional free-text notes (exchange, memo, plan name)
    #[serde(default)]
    pub notes: Option<String>,
}

impl Transaction {
    pub fn new(
        asset: Asset,
        kind: TransactionKind,
        quantity: f64,
        unit_price_usd: f64,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset,
            kind,
            quantity,
            unit_price_usd,
            date,
            notes: None,
        }
    }

    pub fn buy(asset: Asset, quantity: f64, unit_price_usd: f64, date: NaiveDate) -> Self {
        Self::new(asset, TransactionKind::Buy, quantity, unit_price_usd, date)
    }

    pub fn sell(asset: Asset, quantity: f64, unit_price_usd: f64, date: NaiveDate) -> Self {
        Self::new(asset, TransactionKind::Sell, quantity, unit_price_usd, date)
    }

    /// Attach notes (builder style).
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Gross USD value of the trade (`quantity × unit_price_usd`).
    pub fn value_usd(&self) -> f64 {
        self.quantity * self.unit_price_usd
    }

    /// Reject records that would corrupt running totals.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Transaction {}: quantity must be a positive number, got {}",
                self.id, self.quantity
            )));
        }
        if !self.unit_price_usd.is_finite() || self.unit_price_usd <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Transaction {}: unit price must be a positive number, got {}",
                self.id, self.unit_price_usd
            )));
        }
        Ok(())
    }
}
