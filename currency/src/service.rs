use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Cache, ScrapeError};
use proxypool::ProxyPoolManager;
use retry::RetryConfig;

use crate::parse;

const CACHE_KEY: &str = "currency_rates:trueskins";
const CACHE_TTL_SECS: u64 = 3600;
const PRIMARY_URL: &str = "https://trueskins.org/currencies";
const FALLBACK_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// The two upstream reads `CurrencyService` needs: the primary source through the proxy
/// pool (rate-limit-prone, like every other marketplace-adjacent read) and the fallback
/// API fetched directly — the source never routes the fallback through a proxy.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch_primary(&self) -> Result<String, ScrapeError>;
    async fn fetch_fallback(&self) -> Result<String, ScrapeError>;
}

pub struct HttpRateFetcher {
    pool: Arc<ProxyPoolManager>,
    retry_cfg: RetryConfig,
    direct: reqwest::Client,
}

impl HttpRateFetcher {
    pub fn new(pool: Arc<ProxyPoolManager>, retry_cfg: RetryConfig) -> Self {
        Self {
            pool,
            retry_cfg,
            direct: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().expect("static config"),
        }
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch_primary(&self) -> Result<String, ScrapeError> {
        retry::http::get_via_proxy(&self.pool, &self.retry_cfg, REQUEST_TIMEOUT, USER_AGENT, PRIMARY_URL).await
    }

    async fn fetch_fallback(&self) -> Result<String, ScrapeError> {
        self.direct
            .get(FALLBACK_URL)
            .send()
            .await
            .map_err(|e| ScrapeError::UpstreamTransient(e.to_string()))?
            .text()
            .await
            .map_err(|e| ScrapeError::UpstreamTransient(e.to_string()))
    }
}

/// Periodic cross-rate fetch with provider failover and a redis-backed cache, matching
/// `services/currency_service.py`'s `CurrencyService`. `convert` never errors on a missing
/// code — the caller decides whether an absent rate blocks its own operation.
pub struct CurrencyService {
    fetcher: Arc<dyn RateFetcher>,
    cache: Arc<dyn Cache>,
}

impl CurrencyService {
    pub fn new(fetcher: Arc<dyn RateFetcher>, cache: Arc<dyn Cache>) -> Self {
        Self { fetcher, cache }
    }

    async fn cached_rates(&self) -> Option<HashMap<String, f64>> {
        let raw = self.cache.get(CACHE_KEY).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    async fn store_rates(&self, rates: &HashMap<String, f64>) {
        if let Ok(json) = serde_json::to_string(rates) {
            let _ = self.cache.setex(CACHE_KEY, &json, CACHE_TTL_SECS).await;
        }
    }

    /// Returns the cached rate set if warm; otherwise fetches the primary source, falling
    /// back to the public API if the primary is unparseable or missing any target
    /// currency. Only a complete rate set (covering every `TARGET_CURRENCIES` code) is
    /// cached, matching the source's `len(rates) >= len(TARGET_CURRENCIES)` guard.
    pub async fn get_rates(&self) -> HashMap<String, f64> {
        if let Some(cached) = self.cached_rates().await {
            return cached;
        }

        let mut rates = match self.fetcher.fetch_primary().await {
            Ok(body) => parse::parse_defensive(&body).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "currency: primary source unreachable");
                HashMap::new()
            }
        };

        let complete = parse::TARGET_CURRENCIES.iter().all(|c| rates.contains_key(*c));
        if !complete {
            tracing::warn!("currency: primary source incomplete, falling back to public API");
            match self.fetcher.fetch_fallback().await {
                Ok(body) => {
                    if let Some(fallback_rates) = parse::parse_fallback_api(&body) {
                        rates = fallback_rates;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "currency: fallback API unreachable"),
            }
        }

        if !rates.is_empty() {
            self.store_rates(&rates).await;
        }
        rates
    }

    /// Whether `code` is one this system can ever convert to — the base `USD` or a code
    /// the rate cache currently tracks. A `MonitoringTask`'s `currency_code` should be
    /// checked against this at task-creation time (rejected up front, per the Open
    /// Questions resolution) rather than silently skipping the comparison on every check.
    pub fn is_supported_currency(code: &str) -> bool {
        let upper = code.to_uppercase();
        upper == "USD" || parse::TARGET_CURRENCIES.contains(&upper.as_str())
    }

    /// Converts a USD price (in cents) to every currency code the current rate cache
    /// holds. A code absent from the cache is simply absent from the result.
    pub async fn convert(&self, usd_price_cents: i64) -> HashMap<String, i64> {
        let rates = self.get_rates().await;
        rates
            .into_iter()
            .map(|(code, rate)| (code, ((usd_price_cents as f64) * rate).round() as i64))
            .collect()
    }
}

/// Runs independently of the task dispatch loop, on its own fixed cadence — refreshing
/// the shared rate cache here means every scrape that needs a converted price finds it
/// already warm instead of paying the fetch inline.
pub async fn run_refresh_loop(service: Arc<CurrencyService>, interval: std::time::Duration) {
    loop {
        let rates = service.get_rates().await;
        tracing::debug!(currencies = rates.len(), "currency: rate cache refreshed");
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InMemoryCache;

    #[test]
    fn usd_and_tracked_codes_are_supported_but_others_are_not() {
        assert!(CurrencyService::is_supported_currency("USD"));
        assert!(CurrencyService::is_supported_currency("thb"));
        assert!(!CurrencyService::is_supported_currency("EUR"));
    }

    struct FakeFetcher {
        primary: Result<String, ScrapeError>,
        fallback: Result<String, ScrapeError>,
    }

    #[async_trait]
    impl RateFetcher for FakeFetcher {
        async fn fetch_primary(&self) -> Result<String, ScrapeError> {
            self.primary.as_ref().map(|s| s.clone()).map_err(|_| ScrapeError::UpstreamTransient("x".into()))
        }
        async fn fetch_fallback(&self) -> Result<String, ScrapeError> {
            self.fallback.as_ref().map(|s| s.clone()).map_err(|_| ScrapeError::UpstreamTransient("x".into()))
        }
    }

    #[tokio::test]
    async fn uses_primary_source_when_complete() {
        let fetcher = Arc::new(FakeFetcher {
            primary: Ok(r#"{"THB": 35.5, "CNY": 7.2, "RUB": 90.0}"#.to_string()),
            fallback: Ok("{}".to_string()),
        });
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let svc = CurrencyService::new(fetcher, cache);
        let rates = svc.get_rates().await;
        assert_eq!(rates["THB"], 35.5);
    }

    #[tokio::test]
    async fn falls_back_when_primary_is_incomplete() {
        let fetcher = Arc::new(FakeFetcher {
            primary: Ok(r#"{"THB": 35.5}"#.to_string()),
            fallback: Ok(r#"{"base":"USD","rates":{"THB":36.0,"CNY":7.1,"RUB":91.0}}"#.to_string()),
        });
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let svc = CurrencyService::new(fetcher, cache);
        let rates = svc.get_rates().await;
        assert_eq!(rates["THB"], 36.0);
    }

    #[tokio::test]
    async fn convert_scales_usd_cents_by_cached_rate() {
        let fetcher = Arc::new(FakeFetcher {
            primary: Ok(r#"{"THB": 35.5, "CNY": 7.2, "RUB": 90.0}"#.to_string()),
            fallback: Ok("{}".to_string()),
        });
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let svc = CurrencyService::new(fetcher, cache);
        let out = svc.convert(1000).await;
        assert_eq!(out["THB"], 3550);
    }

    #[tokio::test]
    async fn warm_cache_skips_the_network_entirely() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        cache
            .setex(CACHE_KEY, r#"{"THB": 40.0}"#, CACHE_TTL_SECS)
            .await
            .unwrap();
        let fetcher = Arc::new(FakeFetcher {
            primary: Err(ScrapeError::UpstreamTransient("unreachable".into())),
            fallback: Err(ScrapeError::UpstreamTransient("unreachable".into())),
        });
        let svc = CurrencyService::new(fetcher, cache);
        let rates = svc.get_rates().await;
        assert_eq!(rates["THB"], 40.0);
    }
}
