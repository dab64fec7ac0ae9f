pub mod errors;
pub mod math;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::{Duration, NaiveDate};
use models::{
    analytics::{BenchmarkComparison, DailyChange, RiskMetrics, TransactionAnalysis},
    asset::Asset,
    dca::DcaPlan,
    history::{Aggregation, HistoryPeriod, PortfolioHistory},
    holding::Holding,
    ledger::Ledger,
    performance::PerformanceMetrics,
    price::{PriceFreshness, PriceHistory, Quote},
    settings::{Settings, MAX_STALE_PRICE_MAX_AGE_DAYS},
    transaction::{Transaction, TransactionKind},
    valuation::ValuationSnapshot,
};
use providers::registry::PriceProviderRegistry;
use services::{
    analytics_service::AnalyticsService,
    dca_service::DcaService,
    holdings_service::HoldingsCalculator,
    ledger_service::LedgerService,
    performance_service::PerformanceService,
    price_service::{PriceService, PriceSource},
    valuation_service::{self, ValuationService},
};
use std::collections::HashMap;
use storage::manager::StorageManager;

use errors::CoreError;

/// Maximum history date range in days (10 years).
const MAX_HISTORY_RANGE_DAYS: i64 = 3650;

/// Accepted bounds for the annual risk-free rate (as a fraction).
const RISK_FREE_RATE_RANGE: std::ops::RangeInclusive<f64> = -1.0..=1.0;

/// Main entry point for the Crypto Tracker core library.
/// Holds the ledger and all services needed to operate on it.
///
/// The price cache lives inside the price service while the tracker is
/// open and is written back into the ledger file on save.
#[must_use]
pub struct CryptoTracker {
    ledger: Ledger,
    ledger_service: LedgerService,
    price_service: PriceService,
    valuation_service: ValuationService,
    performance_service: PerformanceService,
    analytics_service: AnalyticsService,
    dca_service: DcaService,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for CryptoTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoTracker")
            .field("transactions", &self.ledger.transactions.len())
            .field("settings", &self.ledger.settings)
            .field("cached_prices", &self.cache_total_entries())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl CryptoTracker {
    /// Create a brand new empty ledger with default settings and the
    /// default providers.
    pub fn create_new() -> Self {
        let ledger = Ledger::default();
        let registry = PriceProviderRegistry::new_with_defaults(&ledger.settings);
        Self::build(ledger, registry)
    }

    /// Open `ledger` with a custom provider registry (other hosts, mocks).
    pub fn with_registry(ledger: Ledger, registry: PriceProviderRegistry) -> Self {
        Self::build(ledger, registry)
    }

    /// Load an existing ledger from bytes.
    /// Use this for WASM / Tauri where the frontend handles file I/O.
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, CoreError> {
        let ledger = StorageManager::load_from_bytes(data)?;
        let registry = PriceProviderRegistry::new_with_defaults(&ledger.settings);
        Ok(Self::build(ledger, registry))
    }

    /// Save the ledger (including the price cache) to bytes.
    /// Clears the unsaved-changes flag on success.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, CoreError> {
        let bytes = StorageManager::save_to_bytes(&self.persisted_ledger())?;
        self.dirty = false;
        Ok(bytes)
    }

    /// Load from a ledger file on disk (native only, not WASM).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str) -> Result<Self, CoreError> {
        let ledger = StorageManager::load_from_file(path)?;
        let registry = PriceProviderRegistry::new_with_defaults(&ledger.settings);
        Ok(Self::build(ledger, registry))
    }

    /// Save to a ledger file on disk (native only, not WASM).
    /// Clears the unsaved-changes flag on success.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(&mut self, path: &str) -> Result<(), CoreError> {
        StorageManager::save_to_file(&self.persisted_ledger(), path)?;
        self.dirty = false;
        Ok(())
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Record a buy or sell. Sells larger than the holdings at that date
    /// (or that would overdraw a later sell) are rejected.
    pub fn add_transaction(
        &mut self,
        asset: Asset,
        kind: TransactionKind,
        quantity: f64,
        unit_price_usd: f64,
        date: NaiveDate,
    ) -> Result<uuid::Uuid, CoreError> {
        let tx = Transaction::new(asset, kind, quantity, unit_price_usd, date);
        let id = tx.id;
        self.ledger_service.add_transaction(&mut self.ledger, tx)?;
        self.dirty = true;
        Ok(id)
    }

    /// Record a buy or sell with notes attached.
    pub fn add_transaction_with_notes(
        &mut self,
        asset: Asset,
        kind: TransactionKind,
        quantity: f64,
        unit_price_usd: f64,
        date: NaiveDate,
        notes: impl Into<String>,
    ) -> Result<uuid::Uuid, CoreError> {
        let tx = Transaction::new(asset, kind, quantity, unit_price_usd, date).with_notes(notes);
        let id = tx.id;
        self.ledger_service.add_transaction(&mut self.ledger, tx)?;
        self.dirty = true;
        Ok(id)
    }

    /// Add multiple transactions at once (all-or-nothing).
    /// Returns the IDs of all added transactions.
    pub fn add_transactions(&mut self, txs: Vec<Transaction>) -> Result<Vec<uuid::Uuid>, CoreError> {
        let ids = txs.iter().map(|t| t.id).collect();
        self.ledger_service.add_transactions(&mut self.ledger, txs)?;
        self.dirty = true;
        Ok(ids)
    }

    pub fn get_transaction(&self, id: uuid::Uuid) -> Result<&Transaction, CoreError> {
        self.ledger_service.find(&self.ledger, id)
    }

    /// All transactions, newest first.
    #[must_use]
    pub fn get_transactions(&self) -> Vec<&Transaction> {
        self.ledger_service.get_transactions(&self.ledger)
    }

    #[must_use]
    pub fn get_transactions_for_asset(&self, asset: Asset) -> Vec<&Transaction> {
        self.ledger_service
            .get_transactions_for_asset(&self.ledger, asset)
    }

    #[must_use]
    pub fn get_transactions_by_kind(&self, kind: TransactionKind) -> Vec<&Transaction> {
        self.ledger_service.get_transactions_by_kind(&self.ledger, kind)
    }

    /// Transactions within a date range (inclusive), newest first.
    #[must_use]
    pub fn get_transactions_in_range(&self, from: NaiveDate, to: NaiveDate) -> Vec<&Transaction> {
        self.ledger_service
            .get_transactions_in_range(&self.ledger, from, to)
    }

    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.ledger.transactions.len()
    }

    // ── Holdings & Valuation ────────────────────────────────────────

    /// Holdings per asset from every transaction dated on or before `as_of`.
    pub fn get_holdings(&self, as_of: NaiveDate) -> Result<HashMap<Asset, Holding>, CoreError> {
        self.calculator().compute_holdings(&self.ledger.transactions, as_of)
    }

    /// Value the holdings at `as_of` with caller-supplied prices.
    pub fn value_at(
        &self,
        as_of: NaiveDate,
        prices: &HashMap<Asset, f64>,
    ) -> Result<ValuationSnapshot, CoreError> {
        let holdings = self.get_holdings(as_of)?;
        self.valuation_service.value_portfolio(&holdings, prices, as_of)
    }

    /// Live valuation of today's holdings.
    ///
    /// Always asks the providers for current prices; if they all fail, the
    /// last known quote is used and the snapshot is marked `Stale`.
    pub async fn get_valuation(&self) -> Result<ValuationSnapshot, CoreError> {
        let today = today();
        let holdings = self.get_holdings(today)?;
        self.valuation_service
            .value_live(&holdings, &self.price_service, today)
            .await
    }

    // ── Performance & Analytics ─────────────────────────────────────

    /// ROI, annualized return, allocation, DCA vs lump sum and best/worst
    /// week as of `as_of`.
    ///
    /// For today (or later) held assets are priced live; for past dates
    /// the price history on or before `as_of` is used.
    pub async fn get_performance_metrics(
        &self,
        as_of: NaiveDate,
    ) -> Result<PerformanceMetrics, CoreError> {
        let history = match self.ledger.first_date() {
            Some(first) if first <= as_of => {
                self.price_service
                    .history_for(&self.ledger.assets(), first, as_of)
                    .await?
            }
            _ => PriceHistory::new(),
        };

        let quotes = if as_of >= today() {
            let holdings = self.get_holdings(as_of)?;
            self.live_quotes(&holdings).await?
        } else {
            HashMap::new()
        };
        let current_prices: HashMap<Asset, f64> = quotes
            .iter()
            .map(|(&asset, quote)| (asset, quote.price))
            .collect();

        let mut metrics = self.performance_service.compute_performance_metrics(
            &self.ledger.transactions,
            &history,
            &current_prices,
            as_of,
        )?;
        if quotes.values().any(|q| q.freshness == PriceFreshness::Stale) {
            metrics.price_freshness = PriceFreshness::Stale;
        }
        Ok(metrics)
    }

    /// Portfolio history over a preset window ending today.
    pub async fn get_portfolio_history(
        &self,
        period: HistoryPeriod,
        aggregation: Aggregation,
    ) -> Result<PortfolioHistory, CoreError> {
        let to = today();
        let from = to - Duration::days(period.days());
        self.get_history_range(from, to, aggregation.interval_days(period))
            .await
    }

    /// Portfolio history over an explicit range, sampled every
    /// `interval_days`.
    pub async fn get_history_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        interval_days: i64,
    ) -> Result<PortfolioHistory, CoreError> {
        validate_range(from, to)?;
        let history = self
            .price_service
            .history_for(&self.ledger.assets(), from, to)
            .await?;
        self.analytics_service.portfolio_history(
            &self.ledger.transactions,
            &history,
            from,
            to,
            interval_days,
        )
    }

    /// Risk statistics over daily samples of the given window, using the
    /// configured risk-free rate.
    pub async fn get_risk_metrics(&self, period: HistoryPeriod) -> Result<RiskMetrics, CoreError> {
        let series = self
            .get_portfolio_history(period, Aggregation::Daily)
            .await?;
        let holdings = self.get_holdings(today())?;
        Ok(self.analytics_service.risk_metrics(
            &series,
            &holdings,
            self.ledger.settings.risk_free_rate,
        ))
    }

    /// Portfolio return against BTC, ETH and a 50/50 blend over the window.
    pub async fn get_benchmark_comparison(
        &self,
        period: HistoryPeriod,
    ) -> Result<BenchmarkComparison, CoreError> {
        let to = today();
        let from = to - Duration::days(period.days());
        // Benchmarks need both price series even for a single-asset ledger.
        let history = self
            .price_service
            .history_for(&Asset::ALL, from, to)
            .await?;
        let series = self.analytics_service.portfolio_history(
            &self.ledger.transactions,
            &history,
            from,
            to,
            1,
        )?;
        Ok(self.analytics_service.benchmark_comparison(&series))
    }

    /// Realized and unrealized P/L per asset, with every trade annotated.
    pub async fn get_transaction_analysis(&self) -> Result<TransactionAnalysis, CoreError> {
        let today = today();
        let holdings = self.get_holdings(today)?;
        let prices: HashMap<Asset, f64> = self
            .live_quotes(&holdings)
            .await?
            .into_iter()
            .map(|(asset, quote)| (asset, quote.price))
            .collect();
        self.analytics_service
            .transaction_analysis(&self.ledger.transactions, &prices, today)
    }

    /// Value change from the day before `date` to `date`.
    pub async fn get_daily_change(&self, date: NaiveDate) -> Result<DailyChange, CoreError> {
        let history = self
            .price_service
            .history_for(&self.ledger.assets(), date - Duration::days(1), date)
            .await?;
        self.analytics_service
            .daily_change(&self.ledger.transactions, &history, date)
    }

    // ── DCA Plans ───────────────────────────────────────────────────

    /// The purchases `plan` would have made up to `until`, without
    /// touching the ledger.
    pub async fn simulate_dca_plan(
        &self,
        plan: &DcaPlan,
        until: NaiveDate,
    ) -> Result<Vec<Transaction>, CoreError> {
        validate_range(plan.start, until)?;
        let mut assets: Vec<Asset> = plan.legs.iter().map(|l| l.asset).collect();
        assets.sort();
        assets.dedup();

        let history = self
            .price_service
            .history_for(&assets, plan.start, until)
            .await?;
        self.dca_service.simulate(plan, &history, until)
    }

    /// Simulate `plan` and append its purchases to the ledger (all-or-nothing).
    pub async fn apply_dca_plan(
        &mut self,
        plan: &DcaPlan,
        until: NaiveDate,
    ) -> Result<Vec<uuid::Uuid>, CoreError> {
        let txs = self.simulate_dca_plan(plan, until).await?;
        self.add_transactions(txs)
    }

    // ── Prices ──────────────────────────────────────────────────────

    /// USD price of `asset` on `date`. Uses cache first, falls back to API
    /// providers.
    pub async fn get_price(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError> {
        self.price_service.price_on_date(asset, date).await
    }

    /// Live price of `asset` (stale fallback if every provider fails).
    pub async fn get_current_price(&self, asset: Asset) -> Result<Quote, CoreError> {
        self.price_service.current_price(asset).await
    }

    /// Refresh live prices for every currently held asset.
    pub async fn refresh_prices(&self) -> Result<Vec<Quote>, CoreError> {
        let holdings = self.get_holdings(today())?;
        let mut quotes: Vec<Quote> = self.live_quotes(&holdings).await?.into_values().collect();
        quotes.sort_by_key(|q| q.asset);
        Ok(quotes)
    }

    // ── Cache Management ────────────────────────────────────────────

    /// Get the total number of cached price points.
    #[must_use]
    pub fn cache_total_entries(&self) -> usize {
        self.price_service.with_cache(|c| c.total_entries())
    }

    /// Get the number of assets with cached prices.
    #[must_use]
    pub fn cache_asset_count(&self) -> usize {
        self.price_service.with_cache(|c| c.history.asset_count())
    }

    /// Remove all cached price points older than `before` date.
    /// Returns the number of entries removed.
    pub fn cache_prune_before(&mut self, before: NaiveDate) -> usize {
        let removed = self.price_service.update_cache(|c| c.prune_before(before));
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Clear all cached price data.
    pub fn cache_clear(&mut self) {
        self.price_service.update_cache(|c| c.clear());
        self.dirty = true;
    }

    /// Get a specific cached price.
    #[must_use]
    pub fn get_cached_price(&self, asset: Asset, date: NaiveDate) -> Option<f64> {
        self.price_service
            .with_cache(|c| c.history.get_price(asset, date))
    }

    /// Manually insert a price into the cache (offline use, historical import).
    pub fn set_cached_price(
        &mut self,
        asset: Asset,
        date: NaiveDate,
        price: f64,
    ) -> Result<(), CoreError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Cached price for {asset} must be a positive number, got {price}"
            )));
        }
        self.price_service
            .update_cache(|c| c.history.set_price(asset, date, price));
        self.dirty = true;
        Ok(())
    }

    /// The last successful live quote for `asset`, if any.
    #[must_use]
    pub fn get_last_quote(&self, asset: Asset) -> Option<Quote> {
        self.price_service.with_cache(|c| c.last_quote(asset))
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Get current settings.
    #[must_use]
    pub fn get_settings(&self) -> &Settings {
        &self.ledger.settings
    }

    /// Set or clear the CoinGecko API key.
    /// Rebuilds the default provider registry so the key takes effect
    /// immediately; the price cache is kept.
    pub fn set_coingecko_api_key(&mut self, key: Option<String>) {
        self.ledger.settings.coingecko_api_key = key.filter(|k| !k.trim().is_empty());
        let registry = PriceProviderRegistry::new_with_defaults(&self.ledger.settings);
        self.price_service = PriceService::new(
            registry,
            self.price_service.cache_snapshot(),
            self.ledger.settings.stale_price_max_age_days,
        );
        self.dirty = true;
    }

    /// Annual risk-free rate as a fraction (0.02 = 2%).
    pub fn set_risk_free_rate(&mut self, rate: f64) -> Result<(), CoreError> {
        if !rate.is_finite() || !RISK_FREE_RATE_RANGE.contains(&rate) {
            return Err(CoreError::ValidationError(format!(
                "Invalid risk-free rate {rate}: expected a fraction between -1 and 1 (e.g., 0.02)"
            )));
        }
        self.ledger.settings.risk_free_rate = rate;
        self.dirty = true;
        Ok(())
    }

    /// How many days old a fallback quote may be.
    pub fn set_stale_price_max_age_days(&mut self, days: i64) -> Result<(), CoreError> {
        if !(0..=MAX_STALE_PRICE_MAX_AGE_DAYS).contains(&days) {
            return Err(CoreError::ValidationError(format!(
                "Stale price max age must be between 0 and {MAX_STALE_PRICE_MAX_AGE_DAYS} days, got {days}"
            )));
        }
        self.ledger.settings.stale_price_max_age_days = days;
        self.price_service.set_stale_max_age_days(days);
        self.dirty = true;
        Ok(())
    }

    /// Returns `true` if the ledger has been modified since the last save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    // ── Convenience Helpers ─────────────────────────────────────────

    /// Get the date of the earliest transaction in the ledger.
    #[must_use]
    pub fn earliest_transaction_date(&self) -> Option<NaiveDate> {
        self.ledger.first_date()
    }

    /// Get the date of the most recent transaction in the ledger.
    #[must_use]
    pub fn latest_transaction_date(&self) -> Option<NaiveDate> {
        self.ledger.last_date()
    }

    /// Days since the first transaction (portfolio age).
    #[must_use]
    pub fn portfolio_age_days(&self) -> Option<i64> {
        self.earliest_transaction_date()
            .map(|d| (today() - d).num_days())
    }

    // ── Export / Import ─────────────────────────────────────────────

    /// Export all transactions as a JSON string.
    pub fn export_transactions_to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(&self.ledger.transactions).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize transactions to JSON: {e}"))
        })
    }

    /// Import transactions from a JSON string (all-or-nothing).
    /// Returns the number of transactions imported.
    pub fn import_transactions_from_json(&mut self, json: &str) -> Result<usize, CoreError> {
        let txs: Vec<Transaction> = serde_json::from_str(json)?;
        let count = txs.len();
        self.add_transactions(txs)?;
        Ok(count)
    }

    /// The full ledger as JSON (snapshot for debugging/display).
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(&self.persisted_ledger())
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize ledger: {e}")))
    }

    // ── Provider Availability ───────────────────────────────────────

    #[must_use]
    pub fn is_provider_available(&self, asset: Asset) -> bool {
        self.price_service.has_provider_for(asset)
    }

    #[must_use]
    pub fn get_provider_names(&self) -> Vec<String> {
        self.price_service.provider_names()
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(mut ledger: Ledger, registry: PriceProviderRegistry) -> Self {
        ledger.settings.sanitize();
        let cache = std::mem::take(&mut ledger.price_cache);
        let price_service =
            PriceService::new(registry, cache, ledger.settings.stale_price_max_age_days);
        let calculator = HoldingsCalculator::new(ledger.settings.cost_basis_method);

        Self {
            ledger_service: LedgerService::new(calculator.clone()),
            performance_service: PerformanceService::new(calculator.clone()),
            analytics_service: AnalyticsService::new(calculator),
            valuation_service: ValuationService::new(),
            dca_service: DcaService::new(),
            price_service,
            ledger,
            dirty: false,
        }
    }

    fn calculator(&self) -> HoldingsCalculator {
        HoldingsCalculator::new(self.ledger.settings.cost_basis_method)
    }

    /// The ledger with the live price cache folded back in.
    fn persisted_ledger(&self) -> Ledger {
        let mut ledger = self.ledger.clone();
        ledger.price_cache = self.price_service.cache_snapshot();
        ledger
    }

    async fn live_quotes(
        &self,
        holdings: &HashMap<Asset, Holding>,
    ) -> Result<HashMap<Asset, Quote>, CoreError> {
        valuation_service::live_quotes(holdings, &self.price_service).await
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), CoreError> {
    if from > to {
        return Err(CoreError::ValidationError(format!(
            "'from' date ({from}) must not be after 'to' date ({to})"
        )));
    }
    let range_days = (to - from).num_days();
    if range_days > MAX_HISTORY_RANGE_DAYS {
        return Err(CoreError::ValidationError(format!(
            "Range of {range_days} days exceeds maximum of {MAX_HISTORY_RANGE_DAYS} days (10 years)"
        )));
    }
    Ok(())
}
