use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use super::traits::PriceProvider;
use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::price::PricePoint;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PROVIDER: &str = "CoinGecko";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko API provider, the primary price source.
///
/// - `/simple/price` for spot prices
/// - `/coins/{id}/history?date=dd-mm-yyyy` for a single past day
/// - `/coins/{id}/market_chart/range` for ranges
///
/// Works without a key on the public tier; a demo key raises rate limits.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

fn api_error(message: String) -> CoreError {
    CoreError::Api {
        provider: PROVIDER.into(),
        message,
    }
}

/// Collapse `[timestamp_ms, price]` samples into one point per UTC day,
/// keeping the earliest sample of each day.
pub fn daily_points(samples: &[(f64, f64)]) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = Vec::new();
    let mut sorted: Vec<&(f64, f64)> = samples.iter().collect();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    for (ts, price) in sorted {
        if !price.is_finite() || *price <= 0.0 {
            continue;
        }
        let Some(dt) = chrono::DateTime::from_timestamp_millis(*ts as i64) else {
            continue;
        };
        let date = dt.date_naive();
        if points.last().is_some_and(|p| p.date == date) {
            continue;
        }
        points.push(PricePoint {
            date,
            price: *price,
        });
    }
    points
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct HistoryResponse {
    market_data: Option<MarketData>,
}

#[derive(Deserialize)]
struct MarketData {
    current_price: HashMap<String, f64>,
}

#[derive(Deserialize)]
struct MarketChartResponse {
    prices: Vec<(f64, f64)>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn get_current_price(&self, asset: Asset) -> Result<f64, CoreError> {
        let id = asset.coin_id();
        let url = format!("{}/simple/price?ids={id}&vs_currencies=usd", self.base_url);

        let resp: HashMap<String, HashMap<String, f64>> = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| api_error(format!("Failed to parse spot price for {asset}: {e}")))?;

        resp.get(id)
            .and_then(|quote| quote.get("usd"))
            .copied()
            .ok_or_else(|| api_error(format!("No USD price for {asset}")))
    }

    async fn get_historical_price(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError> {
        let url = format!(
            "{}/coins/{}/history?date={}&localization=false",
            self.base_url,
            asset.coin_id(),
            date.format("%d-%m-%Y")
        );

        let resp: HistoryResponse = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| api_error(format!("Failed to parse history for {asset}: {e}")))?;

        resp.market_data
            .and_then(|m| m.current_price.get("usd").copied())
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
        let start = from.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end = to.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;
        let url = format!(
            "{}/coins/{}/market_chart/range?vs_currency=usd&from={start}&to={end}",
            self.base_url,
            asset.coin_id()
        );

        let resp: MarketChartResponse = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| api_error(format!("Failed to parse price range for {asset}: {e}")))?;

        Ok(daily_points(&resp.prices))
    }
}
