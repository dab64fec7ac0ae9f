use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::price::PricePoint;

/// Trait abstraction for market-data HTTP providers.
///
/// Each upstream API (CoinGecko, CoinCap) implements this trait; the
/// registry tries them in order, so a provider outage only costs a
/// fallback, never a code change elsewhere. All prices are USD.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Whether this provider can quote `asset`.
    fn supports(&self, _asset: Asset) -> bool {
        true
    }

    /// Latest market price in USD.
    async fn get_current_price(&self, asset: Asset) -> Result<f64, CoreError>;

    /// Daily USD price on a specific past date.
    async fn get_historical_price(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError>;

    /// Daily USD prices for `[from, to]`, sorted by date.
    async fn get_price_range(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;
}
