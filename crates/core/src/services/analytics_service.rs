use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::math::{finite_or_zero, mean, percent_change, percent_of, safe_div, sample_std_dev};
use crate::models::analytics::{
    AnalyzedTransaction, AssetTransactionAnalysis, BenchmarkComparison, BenchmarkReturn, DailyChange,
    RiskMetrics, TransactionAnalysis,
};
use crate::models::asset::Asset;
use crate::models::history::{HistoryPoint, PortfolioHistory, TradeMarker};
use crate::models::holding::Holding;
use crate::models::price::PriceHistory;
use crate::models::transaction::{Transaction, TransactionKind};
use crate::services::holdings_service::{sorted_until, HoldingsCalculator};

/// Upper bound on points in one history series; longer windows are
/// sampled more sparsely.
pub const MAX_HISTORY_POINTS: i64 = 200;

/// VaR needs at least this many returns to mean anything.
const MIN_RETURNS_FOR_VAR: usize = 20;

const DAYS_PER_YEAR: f64 = 365.0;

/// Computes portfolio analytics beyond the headline performance figures:
/// value history, risk statistics, benchmarks, per-trade P/L and daily
/// change.
///
/// All inputs are passed in; prices come from an already-populated
/// [`PriceHistory`].
#[derive(Debug, Clone, Default)]
pub struct AnalyticsService {
    calculator: HoldingsCalculator,
}

impl AnalyticsService {
    pub fn new(calculator: HoldingsCalculator) -> Self {
        Self { calculator }
    }

    /// Sample the portfolio every `interval_days` from `from` through `to`
    /// (the last sample is always `to`).
    ///
    /// Uses incremental computation: O(samples + transactions) instead of
    /// O(samples × transactions). Dates where a held asset has no price on
    /// or before them are skipped; their trade markers move to the next
    /// emitted point.
    pub fn portfolio_history(
        &self,
        transactions: &[Transaction],
        history: &PriceHistory,
        from: NaiveDate,
        to: NaiveDate,
        interval_days: i64,
    ) -> Result<PortfolioHistory, CoreError> {
        if from > to {
            return Err(CoreError::ValidationError(format!(
                "'from' date ({from}) must not be after 'to' date ({to})"
            )));
        }

        let span = (to - from).num_days() + 1;
        // Leave room for the closing sample at `to`.
        let min_interval = (span + MAX_HISTORY_POINTS - 2) / (MAX_HISTORY_POINTS - 1);
        let interval = interval_days.max(1).max(min_interval);

        let txs = sorted_until(transactions, to);
        let mut pending = txs.iter().peekable();
        let mut acc = self.calculator.accumulator();
        let mut markers: Vec<TradeMarker> = Vec::new();
        let mut points = Vec::new();

        for date in sample_dates(from, to, interval) {
            while let Some(tx) = pending.next_if(|t| t.date <= date) {
                acc.apply(tx)?;
                if tx.date >= from {
                    markers.push(TradeMarker {
                        kind: tx.kind,
                        asset: tx.asset,
                        quantity: tx.quantity,
                        value_usd: tx.value_usd(),
                    });
                }
            }

            let Some(point) = history_point(acc.holdings(), history, date) else {
                log::debug!("Skipping history sample {date}: missing price");
                continue;
            };
            points.push(HistoryPoint {
                trades: std::mem::take(&mut markers),
                ..point
            });
        }

        log::info!(
            "Built portfolio history {from}..{to}: {} points every {interval} day(s)",
            points.len()
        );

        Ok(PortfolioHistory {
            interval_days: interval,
            start: points.first().map(|p| p.date),
            end: points.last().map(|p| p.date),
            points,
        })
    }

    /// Risk statistics over a history series.
    ///
    /// Period returns are taken between consecutive points whose earlier
    /// value is positive and annualized with `365 / interval_days` periods
    /// per year. The diversification score is computed from the invested
    /// amounts in `holdings`. With fewer than two returns every figure is 0.
    pub fn risk_metrics(
        &self,
        series: &PortfolioHistory,
        holdings: &HashMap<Asset, Holding>,
        risk_free_rate: f64,
    ) -> RiskMetrics {
        let values: Vec<f64> = series.points.iter().map(|p| p.total_value).collect();
        let returns: Vec<f64> = values
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();

        if returns.len() < 2 {
            return RiskMetrics {
                data_points: series.points.len(),
                ..RiskMetrics::default()
            };
        }

        let periods_per_year = safe_div(DAYS_PER_YEAR, series.interval_days.max(1) as f64);
        let avg = mean(&returns);
        let volatility = sample_std_dev(&returns);
        let annualized_return = avg * periods_per_year;
        let annualized_volatility = volatility * periods_per_year.sqrt();

        let (var_percent, var_usd) = if returns.len() >= MIN_RETURNS_FOR_VAR {
            let mut sorted = returns.clone();
            sorted.sort_by(f64::total_cmp);
            let var = sorted[(sorted.len() as f64 * 0.05) as usize];
            (var * 100.0, var * values.last().copied().unwrap_or(0.0))
        } else {
            (0.0, 0.0)
        };

        RiskMetrics {
            volatility_percent: finite_or_zero(volatility * 100.0),
            annualized_volatility_percent: finite_or_zero(annualized_volatility * 100.0),
            sharpe_ratio: safe_div(annualized_return - risk_free_rate, annualized_volatility),
            max_drawdown_percent: finite_or_zero(max_drawdown(&values) * 100.0),
            value_at_risk_95_percent: finite_or_zero(var_percent),
            value_at_risk_95_usd: finite_or_zero(var_usd),
            average_return_percent: finite_or_zero(avg * 100.0),
            annualized_return_percent: finite_or_zero(annualized_return * 100.0),
            diversification_score: diversification_score(holdings),
            data_points: series.points.len(),
        }
    }

    /// First vs last point of `series`: the portfolio against holding only
    /// BTC, only ETH, or an equal split.
    pub fn benchmark_comparison(&self, series: &PortfolioHistory) -> BenchmarkComparison {
        let (Some(first), Some(last)) = (series.points.first(), series.points.last()) else {
            return BenchmarkComparison {
                start: None,
                end: None,
                portfolio_return_percent: 0.0,
                start_value: 0.0,
                end_value: 0.0,
                btc: benchmark("BTC only", 0.0, 0.0, None, None),
                eth: benchmark("ETH only", 0.0, 0.0, None, None),
                balanced: benchmark("50% BTC / 50% ETH", 0.0, 0.0, None, None),
            };
        };

        let portfolio = percent_change(first.total_value, last.total_value);
        let btc = percent_change(first.btc_price, last.btc_price);
        let eth = percent_change(first.eth_price, last.eth_price);
        let balanced = (btc + eth) / 2.0;
        let known = |p: f64| Some(p).filter(|p| *p > 0.0);

        BenchmarkComparison {
            start: Some(first.date),
            end: Some(last.date),
            portfolio_return_percent: portfolio,
            start_value: first.total_value,
            end_value: last.total_value,
            btc: benchmark("BTC only", btc, portfolio, known(first.btc_price), known(last.btc_price)),
            eth: benchmark("ETH only", eth, portfolio, known(first.eth_price), known(last.eth_price)),
            balanced: benchmark("50% BTC / 50% ETH", balanced, portfolio, None, None),
        }
    }

    /// Per-asset trading summary with realized P/L on every sell.
    ///
    /// Unrealized P/L needs a current price for each held asset; a missing
    /// one is a `PriceNotAvailable` error.
    pub fn transaction_analysis(
        &self,
        transactions: &[Transaction],
        current_prices: &HashMap<Asset, f64>,
        as_of: NaiveDate,
    ) -> Result<TransactionAnalysis, CoreError> {
        let mut acc = self.calculator.accumulator();
        let mut rows: HashMap<Asset, Vec<AnalyzedTransaction>> = HashMap::new();

        for tx in sorted_until(transactions, as_of) {
            let avg_before = acc
                .holding(tx.asset)
                .map_or(0.0, Holding::avg_purchase_price_usd);
            acc.apply(tx)?;

            let (average_buy_price, realized, realized_percent) = match tx.kind {
                TransactionKind::Buy => (None, None, None),
                TransactionKind::Sell => (
                    Some(avg_before),
                    Some(tx.quantity * (tx.unit_price_usd - avg_before)),
                    Some(percent_change(avg_before, tx.unit_price_usd)),
                ),
            };
            rows.entry(tx.asset).or_default().push(AnalyzedTransaction {
                id: tx.id,
                date: tx.date,
                kind: tx.kind,
                quantity: tx.quantity,
                unit_price_usd: tx.unit_price_usd,
                value_usd: tx.value_usd(),
                average_buy_price_usd: average_buy_price,
                realized_profit_loss_usd: realized,
                realized_profit_loss_percent: realized_percent,
            });
        }

        let mut summarize = |asset: Asset| -> Result<AssetTransactionAnalysis, CoreError> {
            let holding = acc
                .holding(asset)
                .cloned()
                .unwrap_or_else(|| Holding::empty(asset));
            let unrealized = if holding.is_open() {
                let price = current_prices.get(&asset).copied().ok_or_else(|| {
                    CoreError::PriceNotAvailable {
                        symbol: asset.symbol().to_string(),
                        date: as_of.to_string(),
                    }
                })?;
                holding.quantity_held * price - holding.total_invested_usd
            } else {
                0.0
            };

            Ok(AssetTransactionAnalysis {
                asset,
                total_bought: holding.total_bought,
                total_sold: holding.total_sold,
                net_quantity: holding.quantity_held,
                total_invested_usd: holding.gross_invested_usd,
                total_received_usd: holding.total_received_usd,
                remaining_cost_basis_usd: holding.total_invested_usd,
                realized_profit_loss_usd: holding.realized_profit_loss_usd,
                unrealized_profit_loss_usd: finite_or_zero(unrealized),
                transactions: rows.remove(&asset).unwrap_or_default(),
            })
        };

        Ok(TransactionAnalysis {
            btc: summarize(Asset::Btc)?,
            eth: summarize(Asset::Eth)?,
        })
    }

    /// Change in value between the day before `date` and `date`, holding
    /// the positions as of `date` constant.
    pub fn daily_change(
        &self,
        transactions: &[Transaction],
        history: &PriceHistory,
        date: NaiveDate,
    ) -> Result<DailyChange, CoreError> {
        let previous_date = date - Duration::days(1);
        let holdings = self.calculator.compute_holdings(transactions, date)?;

        let mut changes: HashMap<Asset, f64> = HashMap::new();
        let mut previous_total = 0.0;
        for holding in holdings.values().filter(|h| h.is_open()) {
            let asset = holding.asset;
            let missing = |d: NaiveDate| CoreError::PriceNotAvailable {
                symbol: asset.symbol().to_string(),
                date: d.to_string(),
            };
            let today = history
                .price_on_or_before(asset, date)
                .ok_or_else(|| missing(date))?;
            let yesterday = history
                .price_on_or_before(asset, previous_date)
                .ok_or_else(|| missing(previous_date))?;

            previous_total += holding.quantity_held * yesterday;
            changes.insert(asset, holding.quantity_held * (today - yesterday));
        }

        let btc = changes.get(&Asset::Btc).copied().unwrap_or(0.0);
        let eth = changes.get(&Asset::Eth).copied().unwrap_or(0.0);
        let total = btc + eth;
        Ok(DailyChange {
            date,
            previous_date,
            btc_change_usd: btc,
            eth_change_usd: eth,
            total_change_usd: total,
            total_change_percent: percent_of(total, previous_total),
        })
    }
}

/// `from, from + interval, ...` and finally `to`.
fn sample_dates(from: NaiveDate, to: NaiveDate, interval: i64) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut date = from;
    while date < to {
        dates.push(date);
        date += Duration::days(interval);
    }
    dates.push(to);
    dates
}

/// Value the open holdings on `date`; `None` if a held asset is unpriced.
fn history_point(
    holdings: &HashMap<Asset, Holding>,
    history: &PriceHistory,
    date: NaiveDate,
) -> Option<HistoryPoint> {
    let mut values: HashMap<Asset, f64> = HashMap::new();
    let mut invested = 0.0;
    for holding in holdings.values().filter(|h| h.is_open()) {
        let price = history.price_on_or_before(holding.asset, date)?;
        values.insert(holding.asset, holding.quantity_held * price);
        invested += holding.total_invested_usd;
    }

    let btc_value = values.get(&Asset::Btc).copied().unwrap_or(0.0);
    let eth_value = values.get(&Asset::Eth).copied().unwrap_or(0.0);
    let total_value = btc_value + eth_value;
    let profit_loss = total_value - invested;
    Some(HistoryPoint {
        date,
        total_value,
        total_invested: invested,
        profit_loss,
        roi_percent: percent_of(profit_loss, invested),
        btc_value,
        eth_value,
        btc_price: history.price_on_or_before(Asset::Btc, date).unwrap_or(0.0),
        eth_price: history.price_on_or_before(Asset::Eth, date).unwrap_or(0.0),
        trades: Vec::new(),
    })
}

/// Largest peak-to-trough decline as a fraction of the peak.
fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// `1 − Σ wᵢ²` over the share of cost basis in each asset.
fn diversification_score(holdings: &HashMap<Asset, Holding>) -> f64 {
    let total: f64 = holdings.values().map(|h| h.total_invested_usd).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let concentration: f64 = holdings
        .values()
        .map(|h| (h.total_invested_usd / total).powi(2))
        .sum();
    finite_or_zero(1.0 - concentration)
}

fn benchmark(
    description: &str,
    return_percent: f64,
    portfolio_return_percent: f64,
    start_price: Option<f64>,
    end_price: Option<f64>,
) -> BenchmarkReturn {
    BenchmarkReturn {
        description: description.to_string(),
        return_percent,
        outperformance_percent: finite_or_zero(portfolio_return_percent - return_percent),
        start_price,
        end_price,
    }
}
