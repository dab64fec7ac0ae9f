use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::math::{annualize, finite_or_zero, percent_change, percent_of, safe_div};
use crate::models::asset::Asset;
use crate::models::holding::Holding;
use crate::models::performance::{
    AssetMetrics, DcaAnalysis, PerformanceMetrics, PerformancePeriods, PeriodReturn, TotalMetrics,
    ValuePoint,
};
use crate::models::price::{PriceFreshness, PriceHistory};
use crate::models::transaction::{Transaction, TransactionKind};
use crate::services::holdings_service::{sorted_until, HoldingsCalculator};

const DAYS_PER_WEEK: i64 = 7;

/// Derives ROI, annualized return, allocation, DCA-vs-lump-sum and
/// best/worst weeks from the ledger and price data.
///
/// Synchronous and pure: every price it needs is passed in, so callers
/// decide whether "current" means live quotes or a historical day.
#[derive(Debug, Clone, Default)]
pub struct PerformanceService {
    calculator: HoldingsCalculator,
}

impl PerformanceService {
    pub fn new(calculator: HoldingsCalculator) -> Self {
        Self { calculator }
    }

    /// Full performance payload as of `as_of`.
    ///
    /// `current_prices` takes precedence; assets missing from it are priced
    /// from `history` on or before `as_of`. A held asset with no price in
    /// either source fails with `PriceNotAvailable`.
    pub fn compute_performance_metrics(
        &self,
        transactions: &[Transaction],
        history: &PriceHistory,
        current_prices: &HashMap<Asset, f64>,
        as_of: NaiveDate,
    ) -> Result<PerformanceMetrics, CoreError> {
        let txs = sorted_until(transactions, as_of);
        let Some(first_date) = txs.first().map(|t| t.date) else {
            return Ok(empty_metrics(history, current_prices, as_of));
        };

        let holdings = self.calculator.compute_holdings(transactions, as_of)?;
        let days_invested = (as_of - first_date).num_days().max(1);

        let mut per_asset: HashMap<Asset, AssetMetrics> = HashMap::new();
        for asset in Asset::ALL {
            let holding = holdings.get(&asset);
            let quantity = holding.map_or(0.0, |h| h.quantity_held);
            let price = match resolve_price(asset, history, current_prices, as_of) {
                Some(price) => price,
                None if quantity > 0.0 => {
                    return Err(CoreError::PriceNotAvailable {
                        symbol: asset.symbol().to_string(),
                        date: as_of.to_string(),
                    })
                }
                None => 0.0,
            };

            let asset_days = txs
                .iter()
                .find(|t| t.asset == asset)
                .map_or(days_invested, |t| (as_of - t.date).num_days().max(1));
            per_asset.insert(asset, asset_metrics(asset, holding, price, asset_days));
        }

        let total_invested: f64 = per_asset.values().map(|m| m.total_invested_usd).sum();
        let total_value: f64 = per_asset.values().map(|m| m.current_value_usd).sum();
        for metrics in per_asset.values_mut() {
            metrics.allocation_percent = percent_of(metrics.current_value_usd, total_value);
        }

        let profit_loss = total_value - total_invested;
        let total_metrics = TotalMetrics {
            total_invested_usd: total_invested,
            current_value_usd: total_value,
            profit_loss_usd: profit_loss,
            roi_percent: percent_of(profit_loss, total_invested),
            annualized_return_percent: annualize(safe_div(profit_loss, total_invested), days_invested),
            days_invested,
        };

        let dca_analysis = dca_analysis(&txs, &per_asset, history, &total_metrics, first_date);

        let series = weekly_value_series(&self.calculator, &txs, history, first_date, as_of)?;
        let performance_periods = scan_weekly_periods(&series);

        log::info!(
            "Computed performance metrics over {} transactions ({} weekly samples) as of {as_of}",
            txs.len(),
            series.len()
        );

        Ok(PerformanceMetrics {
            as_of,
            total_metrics,
            btc_metrics: take_metrics(&mut per_asset, Asset::Btc),
            eth_metrics: take_metrics(&mut per_asset, Asset::Eth),
            dca_analysis,
            performance_periods,
            price_freshness: PriceFreshness::Live,
        })
    }
}

fn take_metrics(per_asset: &mut HashMap<Asset, AssetMetrics>, asset: Asset) -> AssetMetrics {
    per_asset.remove(&asset).unwrap_or_else(|| AssetMetrics::zero(asset))
}

fn resolve_price(
    asset: Asset,
    history: &PriceHistory,
    current_prices: &HashMap<Asset, f64>,
    as_of: NaiveDate,
) -> Option<f64> {
    current_prices
        .get(&asset)
        .copied()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .or_else(|| history.price_on_or_before(asset, as_of))
}

fn asset_metrics(asset: Asset, holding: Option<&Holding>, price: f64, days: i64) -> AssetMetrics {
    let Some(holding) = holding else {
        return AssetMetrics {
            current_price_usd: price,
            ..AssetMetrics::zero(asset)
        };
    };

    let invested = holding.total_invested_usd;
    let value = holding.quantity_held * price;
    let profit_loss = value - invested;
    AssetMetrics {
        asset,
        total_invested_usd: invested,
        current_value_usd: value,
        profit_loss_usd: profit_loss,
        roi_percent: percent_of(profit_loss, invested),
        annualized_return_percent: annualize(safe_div(profit_loss, invested), days),
        allocation_percent: 0.0,
        avg_purchase_price_usd: holding.avg_purchase_price_usd(),
        current_price_usd: price,
        quantity_held: holding.quantity_held,
    }
}

fn empty_metrics(
    history: &PriceHistory,
    current_prices: &HashMap<Asset, f64>,
    as_of: NaiveDate,
) -> PerformanceMetrics {
    let zero_with_price = |asset| AssetMetrics {
        current_price_usd: resolve_price(asset, history, current_prices, as_of).unwrap_or(0.0),
        ..AssetMetrics::zero(asset)
    };

    PerformanceMetrics {
        as_of,
        total_metrics: TotalMetrics {
            total_invested_usd: 0.0,
            current_value_usd: 0.0,
            profit_loss_usd: 0.0,
            roi_percent: 0.0,
            annualized_return_percent: 0.0,
            days_invested: 0,
        },
        btc_metrics: zero_with_price(Asset::Btc),
        eth_metrics: zero_with_price(Asset::Eth),
        dca_analysis: DcaAnalysis {
            dca_vs_lump_sum_percent: 0.0,
            lump_sum_value_usd: 0.0,
            lump_sum_roi_percent: 0.0,
            weekly_avg_investment: 0.0,
            total_weeks_invested: 0,
        },
        performance_periods: PerformancePeriods::default(),
        price_freshness: PriceFreshness::Live,
    }
}

/// Price at which a lump sum in `asset` would have been bought on
/// `first_date`.
///
/// Prefers what was actually paid that day, then the market history.
fn lump_sum_entry_price(
    asset: Asset,
    txs: &[&Transaction],
    history: &PriceHistory,
    first_date: NaiveDate,
) -> Option<f64> {
    let (quantity, cost) = txs
        .iter()
        .filter(|t| t.asset == asset && t.kind == TransactionKind::Buy && t.date == first_date)
        .fold((0.0, 0.0), |(q, c), t| (q + t.quantity, c + t.value_usd()));

    if quantity > 0.0 {
        return Some(cost / quantity);
    }
    history
        .price_on_or_before(asset, first_date)
        .or_else(|| history.first_price_after(asset, first_date))
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Compare the ledger with investing each asset's cost basis in that asset
/// on the first ledger date.
fn dca_analysis(
    txs: &[&Transaction],
    per_asset: &HashMap<Asset, AssetMetrics>,
    history: &PriceHistory,
    totals: &TotalMetrics,
    first_date: NaiveDate,
) -> DcaAnalysis {
    let mut lump_sum_value = 0.0;
    for asset in Asset::ALL {
        let Some(metrics) = per_asset.get(&asset) else {
            continue;
        };
        if metrics.total_invested_usd <= 0.0 {
            continue;
        }
        lump_sum_value += match lump_sum_entry_price(asset, txs, history, first_date) {
            Some(entry) => metrics.total_invested_usd / entry * metrics.current_price_usd,
            // No entry price: DCA and lump sum are indistinguishable.
            None => metrics.current_value_usd,
        };
    }
    let lump_sum_value = finite_or_zero(lump_sum_value);
    let lump_sum_roi = percent_change(totals.total_invested_usd, lump_sum_value);

    let total_weeks = (totals.days_invested + DAYS_PER_WEEK - 1) / DAYS_PER_WEEK;
    DcaAnalysis {
        dca_vs_lump_sum_percent: finite_or_zero(totals.roi_percent - lump_sum_roi),
        lump_sum_value_usd: lump_sum_value,
        lump_sum_roi_percent: lump_sum_roi,
        weekly_avg_investment: safe_div(totals.total_invested_usd, total_weeks.max(1) as f64),
        total_weeks_invested: total_weeks,
    }
}

/// Portfolio value every seven days from `from` through `to`.
///
/// Holdings advance incrementally with the ledger. Each held asset is
/// priced on or before the sample date; a sample is skipped when any held
/// asset has no price yet.
pub fn weekly_value_series(
    calculator: &HoldingsCalculator,
    txs: &[&Transaction],
    history: &PriceHistory,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ValuePoint>, CoreError> {
    let mut acc = calculator.accumulator();
    let mut pending = txs.iter().peekable();
    let mut points = Vec::new();
    let mut date = from;

    while date <= to {
        while let Some(tx) = pending.next_if(|t| t.date <= date) {
            acc.apply(tx)?;
        }

        let mut value = 0.0;
        let mut priced = true;
        for holding in acc.holdings().values().filter(|h| h.is_open()) {
            match history.price_on_or_before(holding.asset, date) {
                Some(price) => value += holding.quantity_held * price,
                None => {
                    priced = false;
                    break;
                }
            }
        }
        if priced {
            points.push(ValuePoint { date, value });
        }

        date += Duration::days(DAYS_PER_WEEK);
    }
    Ok(points)
}

/// Best and worst change between consecutive samples.
///
/// Pairs whose earlier value is not positive are ignored. On ties the
/// earliest interval wins. Without any usable pair both results are
/// `{date: None, return_percent: 0}`.
pub fn scan_weekly_periods(points: &[ValuePoint]) -> PerformancePeriods {
    let mut best: Option<PeriodReturn> = None;
    let mut worst: Option<PeriodReturn> = None;

    for pair in points.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if prev.value <= 0.0 {
            continue;
        }
        let candidate = PeriodReturn {
            date: Some(cur.date),
            return_percent: percent_change(prev.value, cur.value),
        };
        if best.map_or(true, |b| candidate.return_percent > b.return_percent) {
            best = Some(candidate);
        }
        if worst.map_or(true, |w| candidate.return_percent < w.return_percent) {
            worst = Some(candidate);
        }
    }

    PerformancePeriods {
        best_week: best.unwrap_or_default(),
        worst_week: worst.unwrap_or_default(),
    }
}
