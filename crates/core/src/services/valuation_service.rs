use chrono::NaiveDate;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::math::percent_of;
use crate::models::asset::Asset;
use crate::models::holding::Holding;
use crate::models::price::{PriceFreshness, Quote};
use crate::models::valuation::{AssetValuation, ValuationSnapshot};
use crate::services::price_service::PriceSource;

/// Current quotes from `source` for every open position.
pub async fn live_quotes(
    holdings: &HashMap<Asset, Holding>,
    source: &dyn PriceSource,
) -> Result<HashMap<Asset, Quote>, CoreError> {
    let mut quotes = HashMap::new();
    for asset in Asset::ALL {
        if holdings.get(&asset).is_some_and(Holding::is_open) {
            quotes.insert(asset, source.current_price(asset).await?);
        }
    }
    Ok(quotes)
}

/// Applies market prices to holdings.
///
/// Prices are passed in, so the same holdings can be valued against live
/// quotes or against any historical day. [`value_live`](Self::value_live)
/// pulls them from a [`PriceSource`] first.
#[derive(Debug, Clone, Default)]
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Value every asset with a positive quantity.
    ///
    /// A held asset without a price is an error; a price for an asset that
    /// is not held is ignored.
    pub fn value_portfolio(
        &self,
        holdings: &HashMap<Asset, Holding>,
        prices: &HashMap<Asset, f64>,
        as_of: NaiveDate,
    ) -> Result<ValuationSnapshot, CoreError> {
        let mut assets = Vec::new();

        for asset in Asset::ALL {
            let Some(holding) = holdings.get(&asset).filter(|h| h.is_open()) else {
                continue;
            };
            let price = *prices.get(&asset).ok_or_else(|| CoreError::PriceNotAvailable {
                symbol: asset.symbol().to_string(),
                date: as_of.to_string(),
            })?;
            if !price.is_finite() || price < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "Price for {asset} must be a non-negative number, got {price}"
                )));
            }

            let current_value = holding.quantity_held * price;
            let profit_loss = current_value - holding.total_invested_usd;
            assets.push(AssetValuation {
                asset,
                quantity_held: holding.quantity_held,
                avg_purchase_price_usd: holding.avg_purchase_price_usd(),
                current_price_usd: price,
                current_value_usd: current_value,
                total_invested_usd: holding.total_invested_usd,
                profit_loss_usd: profit_loss,
                roi_percent: percent_of(profit_loss, holding.total_invested_usd),
            });
        }

        let total_invested: f64 = assets.iter().map(|a| a.total_invested_usd).sum();
        let current_value: f64 = assets.iter().map(|a| a.current_value_usd).sum();
        let profit_loss = current_value - total_invested;

        Ok(ValuationSnapshot {
            as_of,
            assets,
            total_invested_usd: total_invested,
            current_value_usd: current_value,
            profit_loss_usd: profit_loss,
            roi_percent: percent_of(profit_loss, total_invested),
            price_freshness: PriceFreshness::Live,
        })
    }

    /// Like [`value_portfolio`](Self::value_portfolio), but from quotes: the
    /// snapshot is `Stale` if any quote used for a held asset is.
    pub fn value_with_quotes(
        &self,
        holdings: &HashMap<Asset, Holding>,
        quotes: &HashMap<Asset, Quote>,
        as_of: NaiveDate,
    ) -> Result<ValuationSnapshot, CoreError> {
        let prices: HashMap<Asset, f64> = quotes.iter().map(|(a, q)| (*a, q.price)).collect();
        let mut snapshot = self.value_portfolio(holdings, &prices, as_of)?;

        let stale = snapshot.assets.iter().any(|row| {
            quotes
                .get(&row.asset)
                .is_some_and(|q| q.freshness == PriceFreshness::Stale)
        });
        if stale {
            snapshot.price_freshness = PriceFreshness::Stale;
        }
        Ok(snapshot)
    }

    /// Value holdings at live prices from `source`.
    pub async fn value_live(
        &self,
        holdings: &HashMap<Asset, Holding>,
        source: &dyn PriceSource,
        as_of: NaiveDate,
    ) -> Result<ValuationSnapshot, CoreError> {
        let quotes = live_quotes(holdings, source).await?;
        self.value_with_quotes(holdings, &quotes, as_of)
    }
}
