use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::price::{PriceCache, PriceFreshness, PriceHistory, PricePoint, Quote};
use crate::models::settings::MAX_STALE_PRICE_MAX_AGE_DAYS;
use crate::providers::registry::PriceProviderRegistry;

/// Days of slack accepted at either end of a cached range before the
/// range is considered incomplete.
const RANGE_TOLERANCE_DAYS: i64 = 3;

/// The price capability the valuation and analytics paths depend on.
///
/// `current_price` is always fresh (it never answers from the day cache
/// while a provider is reachable); `price_on_date` may be served from the
/// day cache.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PriceSource: Send + Sync {
    /// Live market price, with a stale fallback when every provider fails.
    async fn current_price(&self, asset: Asset) -> Result<Quote, CoreError>;

    /// USD price on `date`; cacheable per day.
    async fn price_on_date(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError>;

    /// Daily prices for `[from, to]`, sorted by date.
    async fn price_history(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;
}

/// Fetches prices from the provider registry through a day-level cache.
///
/// Cache strategy:
/// - **Historical dates (< today)**: fetched once, trusted forever.
/// - **Today via `price_on_date`**: fetched at most once per day.
/// - **`current_price`**: always asks the providers; the cache is only a
///   fallback, and answers from it are marked [`PriceFreshness::Stale`].
///
/// The cache sits behind an `RwLock`. Fetched data is fully assembled
/// before the write lock is taken and inserted in one critical section, so
/// concurrent readers see either the old or the new state. No lock is held
/// across an `.await`.
pub struct PriceService {
    registry: PriceProviderRegistry,
    cache: RwLock<PriceCache>,
    stale_max_age_days: i64,
}

impl PriceService {
    pub fn new(registry: PriceProviderRegistry, cache: PriceCache, stale_max_age_days: i64) -> Self {
        Self {
            registry,
            cache: RwLock::new(cache),
            stale_max_age_days: stale_max_age_days.clamp(0, MAX_STALE_PRICE_MAX_AGE_DAYS),
        }
    }

    pub fn set_stale_max_age_days(&mut self, days: i64) {
        self.stale_max_age_days = days.clamp(0, MAX_STALE_PRICE_MAX_AGE_DAYS);
    }

    /// Names of all registered providers, in priority order.
    pub fn provider_names(&self) -> Vec<String> {
        self.registry.provider_names()
    }

    pub fn has_provider_for(&self, asset: Asset) -> bool {
        !self.registry.get_providers_for(asset).is_empty()
    }

    /// A copy of the whole cache (for persistence).
    pub fn cache_snapshot(&self) -> PriceCache {
        self.read_cache().clone()
    }

    /// Replace the whole cache atomically.
    pub fn replace_cache(&self, cache: PriceCache) {
        *self.write_cache() = cache;
    }

    /// Run `f` against the cache under the read lock.
    pub fn with_cache<R>(&self, f: impl FnOnce(&PriceCache) -> R) -> R {
        f(&self.read_cache())
    }

    /// Run `f` against the cache under the write lock.
    pub fn update_cache<R>(&self, f: impl FnOnce(&mut PriceCache) -> R) -> R {
        f(&mut self.write_cache())
    }

    /// Build a [`PriceHistory`] covering `[from, to]` for every asset in
    /// `assets`, fetching whatever the cache lacks.
    pub async fn history_for(
        &self,
        assets: &[Asset],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceHistory, CoreError> {
        let mut history = PriceHistory::new();
        for &asset in assets {
            let points = self.price_history(asset, from, to).await?;
            history.set_prices(asset, &points);
        }
        Ok(history)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, PriceCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, PriceCache> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Last known quote for `asset`, if it is recent enough to serve.
    fn stale_fallback(&self, asset: Asset, today: NaiveDate) -> Option<Quote> {
        let cache = self.read_cache();
        let max_age = self.stale_max_age_days;

        if let Some(quote) = cache.last_quote(asset) {
            if (today - quote.fetched_on).num_days() <= max_age {
                return Some(Quote {
                    freshness: PriceFreshness::Stale,
                    ..quote
                });
            }
        }

        let window_start = today
            .checked_sub_signed(chrono::Duration::days(max_age))
            .unwrap_or(NaiveDate::MIN);
        cache
            .history
            .range(asset, window_start, today)
            .last()
            .map(|p| Quote {
                asset,
                price: p.price,
                fetched_on: p.date,
                freshness: PriceFreshness::Stale,
            })
    }

    /// Ask each provider in turn; the first valid price wins.
    async fn fetch_price(&self, asset: Asset, date: NaiveDate, today: NaiveDate) -> Result<f64, CoreError> {
        let providers = self.registry.get_providers_for(asset);
        if providers.is_empty() {
            return Err(CoreError::NoProvider(asset.to_string()));
        }

        let mut last_error = None;
        for provider in &providers {
            let result = if date >= today {
                provider.get_current_price(asset).await
            } else {
                provider.get_historical_price(asset, date).await
            };

            match result {
                Ok(price) if price.is_finite() && price > 0.0 => return Ok(price),
                Ok(price) => {
                    log::warn!("{} returned an invalid {asset} price: {price}", provider.name());
                    last_error = Some(CoreError::Api {
                        provider: provider.name().to_string(),
                        message: format!(
                            "Invalid price returned for {asset}: {price} (must be finite and positive)"
                        ),
                    });
                }
                Err(e) => {
                    log::warn!("{} failed for {asset} on {date}: {e}", provider.name());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(asset.to_string())))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PriceSource for PriceService {
    async fn current_price(&self, asset: Asset) -> Result<Quote, CoreError> {
        let today = chrono::Utc::now().date_naive();

        match self.fetch_price(asset, today, today).await {
            Ok(price) => {
                let quote = Quote {
                    asset,
                    price,
                    fetched_on: today,
                    freshness: PriceFreshness::Live,
                };
                self.write_cache().record_quote(quote);
                Ok(quote)
            }
            Err(e) => match self.stale_fallback(asset, today) {
                Some(quote) => {
                    log::warn!(
                        "Live {asset} price unavailable ({e}); using stale quote from {}",
                        quote.fetched_on
                    );
                    Ok(quote)
                }
                None => Err(e),
            },
        }
    }

    async fn price_on_date(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError> {
        let today = chrono::Utc::now().date_naive();
        if date > today {
            return Err(CoreError::PriceNotAvailable {
                symbol: asset.symbol().to_string(),
                date: date.to_string(),
            });
        }

        {
            let cache = self.read_cache();
            if let Some(price) = cache.history.get_price(asset, date) {
                if date < today || cache.is_today_fresh(asset, today) {
                    log::debug!("Price cache hit: {asset} on {date}");
                    return Ok(price);
                }
            }
        }

        let price = self.fetch_price(asset, date, today).await?;
        let mut cache = self.write_cache();
        cache.history.set_price(asset, date, price);
        if date == today {
            cache.mark_updated_today(asset, today);
        }
        Ok(price)
    }

    async fn price_history(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        if from > to {
            return Err(CoreError::ValidationError(format!(
                "'from' date ({from}) must not be after 'to' date ({to})"
            )));
        }

        let cached = {
            let cache = self.read_cache();
            if cache.history.covers(asset, from, to, RANGE_TOLERANCE_DAYS) {
                log::debug!("Price cache covers {asset} {from}..{to}");
                return Ok(cache.history.range(asset, from, to));
            }
            cache.history.range(asset, from, to)
        };

        let providers = self.registry.get_providers_for(asset);
        let mut last_error = None;
        for provider in &providers {
            match provider.get_price_range(asset, from, to).await {
                Ok(points) => {
                    let valid: Vec<PricePoint> = points
                        .into_iter()
                        .filter(|p| p.price.is_finite() && p.price > 0.0)
                        .collect();
                    log::debug!("{} returned {} {asset} prices", provider.name(), valid.len());
                    let mut cache = self.write_cache();
                    cache.history.set_prices(asset, &valid);
                    return Ok(cache.history.range(asset, from, to));
                }
                Err(e) => {
                    log::warn!("{} range fetch failed for {asset}: {e}", provider.name());
                    last_error = Some(e);
                }
            }
        }

        if !cached.is_empty() {
            log::warn!("Serving partial cached {asset} history for {from}..{to}");
            return Ok(cached);
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(asset.to_string())))
    }
}
