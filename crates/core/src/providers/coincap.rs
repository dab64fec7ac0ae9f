use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use super::traits::PriceProvider;
use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::price::PricePoint;

const BASE_URL: &str = "https://api.coincap.io/v2";
const PROVIDER: &str = "CoinCap";
const MILLIS_PER_DAY: i64 = 86_400_000;

/// CoinCap API provider, used as the fallback behind CoinGecko.
///
/// - **Free**: no API key required.
/// - **Endpoints**: `/assets/{id}` (spot), `/assets/{id}/history?interval=d1` (daily).
///
/// Prices arrive as decimal strings in USD.
pub struct CoinCapProvider {
    client: Client,
    base_url: String,
}

impl CoinCapProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the provider at another host (mirrors, test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
        }
    }

    async fn fetch_history(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let start = from.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        let end = to.and_time(NaiveTime::MIN).and_utc().timestamp_millis() + MILLIS_PER_DAY - 1;
        let url = format!(
            "{}/assets/{}/history?interval=d1&start={start}&end={end}",
            self.base_url,
            asset.coin_id()
        );

        let resp: HistoryResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| api_error(format!("Failed to parse history for {asset}: {e}")))?;

        Ok(parse_history(&resp.data))
    }
}

impl Default for CoinCapProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: PROVIDER.into(),
        message,
    }
}

/// Convert raw history rows into sorted daily points, skipping rows whose
/// price does not parse.
fn parse_history(rows: &[HistoryPoint]) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = rows
        .iter()
        .filter_map(|row| {
            let price: f64 = row.price_usd.parse().ok()?;
            let dt = chrono::DateTime::from_timestamp_millis(row.time)?;
            Some(PricePoint {
                date: dt.date_naive(),
                price,
            })
        })
        .collect();
    points.sort_by_key(|p| p.date);
    points
}

// ── CoinCap API response types ──────────────────────────────────────

#[derive(Deserialize)]
struct AssetResponse {
    data: AssetData,
}

#[derive(Deserialize)]
struct AssetData {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

#[derive(Deserialize)]
struct HistoryResponse {
    data: Vec<HistoryPoint>,
}

#[derive(Deserialize)]
struct HistoryPoint {
    #[serde(rename = "priceUsd")]
    price_usd: String,
    time: i64, // unix timestamp in milliseconds
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PriceProvider for CoinCapProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn get_current_price(&self, asset: Asset) -> Result<f64, CoreError> {
        let url = format!("{}/assets/{}", self.base_url, asset.coin_id());

        let resp: AssetResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| api_error(format!("Failed to parse response for {asset}: {e}")))?;

        resp.data
            .price_usd
            .ok_or_else(|| api_error(format!("No price data for {asset}")))?
            .parse()
            .map_err(|e| api_error(format!("Invalid price format for {asset}: {e}")))
    }

    async fn get_historical_price(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError> {
        self.fetch_history(asset, date, date)
            .await?
            .into_iter()
            .find(|p| p.date == date)
            .map(|p| p.price)
            .ok_or_else(|| CoreError::PriceNotAvailable {
                symbol: asset.symbol().to_string(),
                date: date.to_string(),
            })
    }

    async fn get_price_range(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.fetch_history(asset, from, to).await
    }
}
