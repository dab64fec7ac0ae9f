use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::ledger::Ledger;
use crate::models::transaction::{Transaction, TransactionKind};
use crate::services::holdings_service::HoldingsCalculator;

/// Manages the append-only transaction ledger.
///
/// Pure business logic: no I/O, no API calls. Every write is validated
/// against the whole ledger, so a back-dated sell can never leave a later
/// sell without enough holdings.
pub struct LedgerService {
    calculator: HoldingsCalculator,
}

impl LedgerService {
    pub fn new(calculator: HoldingsCalculator) -> Self {
        Self { calculator }
    }

    /// Append a transaction, keeping the ledger date-sorted.
    pub fn add_transaction(&self, ledger: &mut Ledger, tx: Transaction) -> Result<(), CoreError> {
        self.add_transactions(ledger, vec![tx])
    }

    /// Append several transactions at once. Either all are added or, if
    /// any fails validation, none are.
    pub fn add_transactions(
        &self,
        ledger: &mut Ledger,
        txs: Vec<Transaction>,
    ) -> Result<(), CoreError> {
        let mut candidate = ledger.transactions.clone();
        for tx in txs {
            self.validate_record(&candidate, &tx)?;
            Self::ordered_insert(&mut candidate, tx);
        }
        self.validate_consistency(&candidate)?;

        let added = candidate.len() - ledger.transactions.len();
        ledger.transactions = candidate;
        log::info!("Ledger: appended {added} transaction(s), {} total", ledger.transactions.len());
        Ok(())
    }

    /// All transactions, newest first (for display).
    pub fn get_transactions<'a>(&self, ledger: &'a Ledger) -> Vec<&'a Transaction> {
        ledger.transactions.iter().rev().collect()
    }

    /// Transactions for one asset, newest first.
    pub fn get_transactions_for_asset<'a>(
        &self,
        ledger: &'a Ledger,
        asset: Asset,
    ) -> Vec<&'a Transaction> {
        ledger.transactions.iter().rev().filter(|t| t.asset == asset).collect()
    }

    /// Transactions of one kind, newest first.
    pub fn get_transactions_by_kind<'a>(
        &self,
        ledger: &'a Ledger,
        kind: TransactionKind,
    ) -> Vec<&'a Transaction> {
        ledger.transactions.iter().rev().filter(|t| t.kind == kind).collect()
    }

    /// Transactions dated within `[from, to]`, newest first.
    pub fn get_transactions_in_range<'a>(
        &self,
        ledger: &'a Ledger,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<&'a Transaction> {
        ledger
            .transactions
            .iter()
            .rev()
            .filter(|t| t.date >= from && t.date <= to)
            .collect()
    }

    pub fn find<'a>(&self, ledger: &'a Ledger, id: Uuid) -> Result<&'a Transaction, CoreError> {
        ledger
            .transactions
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))
    }

    /// Record-level checks: positive finite numbers, no future dates,
    /// no duplicate ids.
    fn validate_record(&self, existing: &[Transaction], tx: &Transaction) -> Result<(), CoreError> {
        tx.validate()?;

        // One day of tolerance for timezone differences
        let today = Utc::now().date_naive();
        if let Some(tomorrow) = today.succ_opt() {
            if tx.date > tomorrow {
                return Err(CoreError::ValidationError(format!(
                    "Transaction date {} is in the future",
                    tx.date
                )));
            }
        }

        if existing.iter().any(|t| t.id == tx.id) {
            return Err(CoreError::ValidationError(format!(
                "Duplicate transaction id {}",
                tx.id
            )));
        }
        Ok(())
    }

    /// Replay the whole ledger; any sell exceeding holdings is an overdraft.
    fn validate_consistency(&self, transactions: &[Transaction]) -> Result<(), CoreError> {
        let Some(last) = transactions.last() else {
            return Ok(());
        };
        self.calculator.compute_holdings(transactions, last.date).map(|_| ())
    }

    /// Insert after every transaction dated on or before `tx.date`, so
    /// same-day records keep their arrival order.
    fn ordered_insert(transactions: &mut Vec<Transaction>, tx: Transaction) {
        let pos = transactions.partition_point(|t| t.date <= tx.date);
        transactions.insert(pos, tx);
    }
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new(HoldingsCalculator::default())
    }
}
