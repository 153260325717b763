use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ScrapeError;
use proxypool::ProxyPoolManager;
use retry::RetryConfig;

use crate::page::RenderResponse;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const PAGE_SIZE: u32 = 20;

/// The marketplace reads the scraping pipeline needs: the paged `render/` endpoint and the
/// search-suggestions endpoint used both for wear-variant discovery and (by the sticker
/// resolver, in its own crate) fuzzy sticker lookups.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn fetch_render_page(
        &self,
        appid: i64,
        hash_name: &str,
        start: u32,
        currency: &str,
    ) -> Result<RenderResponse, ScrapeError>;

    /// Returns candidate market hash names whose prefix matches `query` — used to expand
    /// an ambiguous (no wear suffix) hash name into concrete wear variants.
    async fn search_suggestions(&self, query: &str) -> Result<Vec<String>, ScrapeError>;
}

pub struct SteamMarketplaceClient {
    pool: Arc<ProxyPoolManager>,
    retry_cfg: RetryConfig,
}

impl SteamMarketplaceClient {
    pub fn new(pool: Arc<ProxyPoolManager>, retry_cfg: RetryConfig) -> Self {
        Self { pool, retry_cfg }
    }

    async fn get(&self, url: &str) -> Result<String, ScrapeError> {
        retry::http::get_via_proxy(&self.pool, &self.retry_cfg, REQUEST_TIMEOUT, USER_AGENT, url).await
    }
}

#[async_trait]
impl MarketplaceClient for SteamMarketplaceClient {
    async fn fetch_render_page(
        &self,
        appid: i64,
        hash_name: &str,
        start: u32,
        currency: &str,
    ) -> Result<RenderResponse, ScrapeError> {
        let encoded = urlencoding::encode(hash_name);
        let url = format!(
            "https://steamcommunity.com/market/listings/{appid}/{encoded}/render/?query=&start={start}&count={PAGE_SIZE}&currency={currency}&language=english&country=US"
        );
        let body = self.get(&url).await?;
        serde_json::from_str(&body).map_err(|e| ScrapeError::UpstreamInvalid(e.to_string()))
    }

    async fn search_suggestions(&self, query: &str) -> Result<Vec<String>, ScrapeError> {
        let encoded = urlencoding::encode(query);
        let url = format!("https://steamcommunity.com/market/searchsuggestionsresults?q={encoded}");
        let body = self.get(&url).await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ScrapeError::UpstreamInvalid(e.to_string()))?;
        let results = value.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(results
            .into_iter()
            .filter_map(|r| r.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }
}
