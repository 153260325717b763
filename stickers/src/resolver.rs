use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::Cache;

use crate::client::MarketClient;
use crate::html;
use crate::matcher;

const CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(400);

#[derive(Clone)]
pub struct StickerResolverConfig {
    pub appid: i64,
    pub currency: String,
    pub inter_request_delay: Duration,
}

impl Default for StickerResolverConfig {
    fn default() -> Self {
        Self {
            appid: 730,
            currency: "USD".to_string(),
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
        }
    }
}

pub struct StickerPriceResolver {
    client: Arc<dyn MarketClient>,
    cache: Arc<dyn Cache>,
    cfg: StickerResolverConfig,
}

impl StickerPriceResolver {
    pub fn new(client: Arc<dyn MarketClient>, cache: Arc<dyn Cache>, cfg: StickerResolverConfig) -> Self {
        Self { client, cache, cfg }
    }

    fn cache_key(&self, name: &str) -> String {
        format!("sticker_price:{name}:{}:{}", self.cfg.appid, self.cfg.currency)
    }

    /// Strategies in priority order: cache, `priceoverview`, the sticker's own listing
    /// page, then search-suggestions exact (case-folded) match. Returns on first success.
    async fn resolve_one_uncached(&self, name: &str) -> Option<i64> {
        let query_name = if name.to_lowercase().starts_with("sticker") {
            name.to_string()
        } else {
            format!("Sticker | {name}")
        };

        if let Ok(Some(price)) = self
            .client
            .price_overview(self.cfg.appid, &self.cfg.currency, &query_name)
            .await
        {
            return Some(price);
        }

        if let Ok(Some(page)) = self.client.listing_page_html(self.cfg.appid, &query_name).await {
            if let Some(price) = html::parse_promoted_price(&page) {
                return Some(price);
            }
            if let Some(price) = html::parse_g_rg_listing_info(&page) {
                return Some(price);
            }
        }

        if let Ok(results) = self.client.search_suggestions(&query_name).await {
            let target = matcher::normalize(name);
            if let Some((_, price)) = results.iter().find(|(n, _)| matcher::normalize(n) == target) {
                return Some(*price);
            }
        }

        None
    }

    /// Resolves prices for every sticker name in `names`, preserving duplicates in the
    /// output map's key set (a duplicate simply resolves to the same value as its sibling).
    /// Cache-warms every deduped name first, then resolves remaining misses sequentially
    /// with `inter_request_delay` spacing, then retries any still-unresolved names via
    /// fuzzy matching against names this batch did resolve.
    pub async fn resolve_batch(&self, names: &[String]) -> HashMap<String, Option<i64>> {
        let mut deduped = Vec::new();
        for n in names {
            if !deduped.contains(n) {
                deduped.push(n.clone());
            }
        }

        let mut resolved: HashMap<String, i64> = HashMap::new();
        let mut unresolved: Vec<String> = Vec::new();

        for name in &deduped {
            let key = self.cache_key(name);
            match self.cache.get(&key).await {
                Ok(Some(cached)) => {
                    if let Ok(price) = cached.parse::<i64>() {
                        resolved.insert(name.clone(), price);
                        continue;
                    }
                }
                _ => {}
            }
            unresolved.push(name.clone());
        }

        let mut still_unresolved = Vec::new();
        for (i, name) in unresolved.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.inter_request_delay).await;
            }
            match self.resolve_one_uncached(name).await {
                Some(price) => {
                    let _ = self
                        .cache
                        .setex(&self.cache_key(name), &price.to_string(), CACHE_TTL_SECS)
                        .await;
                    resolved.insert(name.clone(), price);
                }
                None => still_unresolved.push(name.clone()),
            }
        }

        let available: HashMap<String, i64> = resolved.clone();
        for name in &still_unresolved {
            if let Some((matched_name, _score)) = matcher::find_best_match(name, &available)
                && let Some(price) = available.get(matched_name)
            {
                resolved.insert(name.clone(), *price);
            }
        }

        names
            .iter()
            .map(|n| (n.clone(), resolved.get(n).copied()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{InMemoryCache, ScrapeError};
    use tokio::sync::Mutex as TMutex;

    struct FakeClient {
        price_overview_calls: TMutex<Vec<String>>,
        overview_prices: HashMap<String, i64>,
    }

    #[async_trait]
    impl MarketClient for FakeClient {
        async fn price_overview(&self, _appid: i64, _currency: &str, market_hash_name: &str) -> Result<Option<i64>, ScrapeError> {
            self.price_overview_calls.lock().await.push(market_hash_name.to_string());
            Ok(self.overview_prices.get(market_hash_name).copied())
        }
        async fn listing_page_html(&self, _appid: i64, _market_hash_name: &str) -> Result<Option<String>, ScrapeError> {
            Ok(None)
        }
        async fn search_suggestions(&self, _query: &str) -> Result<Vec<(String, i64)>, ScrapeError> {
            Ok(vec![])
        }
    }

    fn resolver_with(overview_prices: HashMap<String, i64>) -> StickerPriceResolver {
        let client = Arc::new(FakeClient {
            price_overview_calls: TMutex::new(Vec::new()),
            overview_prices,
        });
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let mut cfg = StickerResolverConfig::default();
        cfg.inter_request_delay = Duration::from_millis(0);
        StickerPriceResolver::new(client, cache, cfg)
    }

    #[tokio::test]
    async fn prefixes_sticker_pipe_when_missing() {
        let mut prices = HashMap::new();
        prices.insert("Sticker | Katowice 2014".to_string(), 500);
        let resolver = resolver_with(prices);
        let out = resolver.resolve_batch(&["Katowice 2014".to_string()]).await;
        assert_eq!(out["Katowice 2014"], Some(500));
    }

    #[tokio::test]
    async fn duplicate_inputs_resolve_to_the_same_price() {
        let mut prices = HashMap::new();
        prices.insert("Sticker | iBUYPOWER".to_string(), 1000);
        let resolver = resolver_with(prices);
        let names = vec!["iBUYPOWER".to_string(), "iBUYPOWER".to_string()];
        let out = resolver.resolve_batch(&names).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out["iBUYPOWER"], Some(1000));
    }

    #[tokio::test]
    async fn fuzzy_match_recovers_an_unresolved_name_from_the_same_batch() {
        let mut prices = HashMap::new();
        prices.insert("Sticker | Crown (Foil)".to_string(), 540);
        let resolver = resolver_with(prices);
        let names = vec!["Crown (Foil)".to_string(), "Crown Foil".to_string()];
        let out = resolver.resolve_batch(&names).await;
        assert_eq!(out["Crown (Foil)"], Some(540));
        assert_eq!(out["Crown Foil"], Some(540));
    }

    #[tokio::test]
    async fn unresolvable_name_maps_to_none() {
        let resolver = resolver_with(HashMap::new());
        let out = resolver.resolve_batch(&["Nonexistent Sticker".to_string()]).await;
        assert_eq!(out["Nonexistent Sticker"], None);
    }
}
