use crate::models::asset::Asset;
use crate::models::settings::Settings;

use super::coincap::CoinCapProvider;
use super::coingecko::CoinGeckoProvider;
use super::traits::PriceProvider;

/// Ordered set of price providers.
///
/// Registration order is priority order: the price service asks the first
/// provider that supports an asset and falls back to the next on failure.
pub struct PriceProviderRegistry {
    providers: Vec<Box<dyn PriceProvider>>,
}

impl PriceProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// CoinGecko first (optionally keyed), CoinCap as fallback.
    pub fn new_with_defaults(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CoinGeckoProvider::new(
            settings.coingecko_api_key.clone(),
        )));
        registry.register(Box::new(CoinCapProvider::new()));
        registry
    }

    /// Register a new price provider at the lowest priority.
    pub fn register(&mut self, provider: Box<dyn PriceProvider>) {
        self.providers.push(provider);
    }

    /// Every provider that supports `asset`, in priority order.
    pub fn get_providers_for(&self, asset: Asset) -> Vec<&dyn PriceProvider> {
        self.providers
            .iter()
            .filter(|p| p.supports(asset))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for PriceProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
