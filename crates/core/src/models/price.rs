use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::asset::Asset;

/// A single daily USD price (date → price).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Whether a quote came straight from a provider or from the fallback cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFreshness {
    /// Fetched from a provider during this request
    #[default]
    Live,
    /// Last known quote, used because every provider failed
    Stale,
}

/// A current-price answer from the price source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub asset: Asset,
    pub price: f64,
    /// Day the price was actually obtained from a provider
    pub fetched_on: NaiveDate,
    pub freshness: PriceFreshness,
}

/// Daily USD price series per asset, each kept sorted by date.
///
/// This is the "price history" the analytics consume. Lookups are binary
/// searches; gaps (missing days) are answered by carrying the last known
/// price forward via [`PriceHistory::price_on_or_before`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    series: HashMap<Asset, Vec<PricePoint>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact price for `(asset, date)`, if recorded.
    pub fn get_price(&self, asset: Asset, date: NaiveDate) -> Option<f64> {
        let points = self.series.get(&asset)?;
        points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| points[idx].price)
    }

    /// Latest price recorded on or before `date`.
    pub fn price_on_or_before(&self, asset: Asset, date: NaiveDate) -> Option<f64> {
        let points = self.series.get(&asset)?;
        match points.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => Some(points[idx].price),
            Err(0) => None,
            Err(idx) => Some(points[idx - 1].price),
        }
    }

    /// Earliest price recorded strictly after `date`.
    pub fn first_price_after(&self, asset: Asset, date: NaiveDate) -> Option<f64> {
        let points = self.series.get(&asset)?;
        let idx = match points.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        points.get(idx).map(|p| p.price)
    }

    /// Insert or overwrite a price, keeping the series sorted.
    pub fn set_price(&mut self, asset: Asset, date: NaiveDate, price: f64) {
        let points = self.series.entry(asset).or_default();
        match points.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => points[idx].price = price,
            Err(idx) => points.insert(idx, PricePoint { date, price }),
        }
    }

    /// Insert many points at once (e.g., from a range API call).
    pub fn set_prices(&mut self, asset: Asset, points: &[PricePoint]) {
        for point in points {
            self.set_price(asset, point.date, point.price);
        }
    }

    /// Every recorded point for `asset` within `[from, to]`.
    pub fn range(&self, asset: Asset, from: NaiveDate, to: NaiveDate) -> Vec<PricePoint> {
        self.series
            .get(&asset)
            .map(|points| {
                let start = points.partition_point(|p| p.date < from);
                let end = points.partition_point(|p| p.date <= to);
                if start < end {
                    points[start..end].to_vec()
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default()
    }

    /// Whether the series for `asset` has a point within `tolerance_days`
    /// of both ends of `[from, to]`.
    pub fn covers(&self, asset: Asset, from: NaiveDate, to: NaiveDate, tolerance_days: i64) -> bool {
        let points = self.range(asset, from, to);
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => {
                (first.date - from).num_days() <= tolerance_days
                    && (to - last.date).num_days() <= tolerance_days
            }
            _ => false,
        }
    }

    /// Restore the sorted-series invariant on data read from disk.
    ///
    /// Sorts each series by date, drops non-finite or non-positive prices,
    /// and keeps the last-listed price for a repeated date. Returns how many
    /// points were dropped.
    pub fn normalize(&mut self) -> usize {
        let mut dropped = 0;
        for points in self.series.values_mut() {
            let before = points.len();
            points.retain(|p| p.price.is_finite() && p.price > 0.0);
            points.sort_by_key(|p| p.date);
            points.dedup_by(|later, kept| {
                if later.date == kept.date {
                    kept.price = later.price;
                    true
                } else {
                    false
                }
            });
            dropped += before - points.len();
        }
        self.series.retain(|_, v| !v.is_empty());
        dropped
    }

    /// Total number of points across all assets.
    pub fn total_entries(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// Number of assets with at least one point.
    pub fn asset_count(&self) -> usize {
        self.series.len()
    }

    /// Drop every point dated before `before`. Returns how many were removed.
    pub fn prune_before(&mut self, before: NaiveDate) -> usize {
        let mut removed = 0;
        for points in self.series.values_mut() {
            let split = points.partition_point(|p| p.date < before);
            removed += split;
            points.drain(..split);
        }
        self.series.retain(|_, v| !v.is_empty());
        removed
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

/// Day-level price cache shared by every request.
///
/// - Historical dates (< today) are fetched once and trusted forever.
/// - Today's historical-style price is refreshed at most once per day.
/// - The last live quote per asset is remembered for stale fallback only;
///   it is never served while a provider is reachable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceCache {
    pub history: PriceHistory,

    /// Day on which today's price was last refreshed, per asset.
    #[serde(default)]
    pub last_updated: HashMap<Asset, NaiveDate>,

    /// Most recent successful live quote per asset.
    #[serde(default)]
    pub last_quotes: HashMap<Asset, Quote>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_today_fresh(&self, asset: Asset, today: NaiveDate) -> bool {
        self.last_updated.get(&asset).is_some_and(|&d| d == today)
    }

    pub fn mark_updated_today(&mut self, asset: Asset, today: NaiveDate) {
        self.last_updated.insert(asset, today);
    }

    /// Remember a successful live quote (and record it as that day's price).
    pub fn record_quote(&mut self, quote: Quote) {
        self.history.set_price(quote.asset, quote.fetched_on, quote.price);
        self.mark_updated_today(quote.asset, quote.fetched_on);
        self.last_quotes.insert(quote.asset, quote);
    }

    pub fn last_quote(&self, asset: Asset) -> Option<Quote> {
        self.last_quotes.get(&asset).copied()
    }

    pub fn total_entries(&self) -> usize {
        self.history.total_entries()
    }

    /// See [`PriceHistory::normalize`].
    pub fn normalize(&mut self) -> usize {
        self.history.normalize()
    }

    /// Prune history and any refresh markers older than `before`.
    pub fn prune_before(&mut self, before: NaiveDate) -> usize {
        let removed = self.history.prune_before(before);
        self.last_updated.retain(|_, updated| *updated >= before);
        removed
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_updated.clear();
        self.last_quotes.clear();
    }
}
