use chrono::{Duration, NaiveDate};

use crate::errors::CoreError;
use crate::models::dca::DcaPlan;
use crate::models::price::PriceHistory;
use crate::models::transaction::Transaction;

pub const DCA_NOTE: &str = "DCA plan";

/// Expands recurring purchase plans into ledger transactions.
#[derive(Debug, Clone, Default)]
pub struct DcaService;

impl DcaService {
    pub fn new() -> Self {
        Self
    }

    /// BUY transactions the plan would have made from `plan.start` through
    /// `until`, priced from `history`.
    ///
    /// Each execution converts `usd_amount` at the day's market price; the
    /// fee is folded into the unit price so it lands in the cost basis.
    /// Periods without an exact price for that day are skipped but still
    /// count toward `every_n_periods`.
    pub fn simulate(
        &self,
        plan: &DcaPlan,
        history: &PriceHistory,
        until: NaiveDate,
    ) -> Result<Vec<Transaction>, CoreError> {
        validate_plan(plan)?;

        let step = Duration::days(plan.frequency.interval_days());
        let mut transactions = Vec::new();
        let mut skipped = 0usize;
        let mut date = plan.start;
        let mut period: u32 = 0;

        while date <= until {
            for leg in &plan.legs {
                if period % leg.every_n_periods != 0 {
                    continue;
                }
                let Some(price) = history.get_price(leg.asset, date).filter(|p| *p > 0.0) else {
                    skipped += 1;
                    continue;
                };

                let units = leg.usd_amount / price;
                let unit_price = (leg.usd_amount + leg.fee_usd) / units;
                transactions.push(
                    Transaction::buy(leg.asset, units, unit_price, date).with_notes(DCA_NOTE),
                );
            }
            date += step;
            period = period.wrapping_add(1);
        }

        if skipped > 0 {
            log::warn!("DCA simulation skipped {skipped} execution(s) with no price data");
        }
        log::info!(
            "DCA simulation from {} to {until}: {} purchases",
            plan.start,
            transactions.len()
        );
        Ok(transactions)
    }
}

fn validate_plan(plan: &DcaPlan) -> Result<(), CoreError> {
    if plan.legs.is_empty() {
        return Err(CoreError::ValidationError(
            "DCA plan needs at least one leg".into(),
        ));
    }
    for leg in &plan.legs {
        if !leg.usd_amount.is_finite() || leg.usd_amount <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "DCA amount for {} must be positive, got {}",
                leg.asset, leg.usd_amount
            )));
        }
        if !leg.fee_usd.is_finite() || leg.fee_usd < 0.0 {
            return Err(CoreError::ValidationError(format!(
                "DCA fee for {} must not be negative, got {}",
                leg.asset, leg.fee_usd
            )));
        }
        if leg.every_n_periods == 0 {
            return Err(CoreError::ValidationError(format!(
                "DCA leg for {}: every_n_periods must be at least 1",
                leg.asset
            )));
        }
    }
    Ok(())
}
