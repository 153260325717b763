use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ScrapeError;
use proxypool::ProxyPoolManager;
use regex::Regex;
use retry::RetryConfig;
use std::sync::OnceLock;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The three marketplace surfaces the sticker resolver reads from, kept behind a trait so
/// the strategy chain and fuzzy-match fallback can be unit tested without real HTTP.
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// `GET priceoverview` for `market_hash_name`. Returns the lowest-price figure in cents.
    async fn price_overview(&self, appid: i64, currency: &str, market_hash_name: &str) -> Result<Option<i64>, ScrapeError>;

    /// Full HTML of a sticker's own listing page.
    async fn listing_page_html(&self, appid: i64, market_hash_name: &str) -> Result<Option<String>, ScrapeError>;

    /// Search-suggestions results: `(market_hash_name, price_cents)` pairs.
    async fn search_suggestions(&self, query: &str) -> Result<Vec<(String, i64)>, ScrapeError>;
}

pub struct SteamMarketClient {
    pool: Arc<ProxyPoolManager>,
    retry_cfg: RetryConfig,
}

impl SteamMarketClient {
    pub fn new(pool: Arc<ProxyPoolManager>, retry_cfg: RetryConfig) -> Self {
        Self { pool, retry_cfg }
    }

    async fn get_via_proxy(&self, url: String) -> Result<String, ScrapeError> {
        retry::http::get_via_proxy(&self.pool, &self.retry_cfg, REQUEST_TIMEOUT, USER_AGENT, &url).await
    }
}

fn lowest_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d,]+\.\d+|[\d,]+)").unwrap())
}

fn parse_money_to_cents(raw: &str) -> Option<i64> {
    let cleaned = raw.replace(',', "");
    let captures = lowest_price_re().captures(&cleaned)?;
    let number = captures.get(1)?.as_str();
    let value: f64 = number.parse().ok()?;
    Some((value * 100.0).round() as i64)
}

#[async_trait]
impl MarketClient for SteamMarketClient {
    async fn price_overview(&self, appid: i64, currency: &str, market_hash_name: &str) -> Result<Option<i64>, ScrapeError> {
        let encoded = urlencoding::encode(market_hash_name);
        let url = format!(
            "https://steamcommunity.com/market/priceoverview/?appid={appid}&currency={currency}&market_hash_name={encoded}"
        );
        let body = self.get_via_proxy(url).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScrapeError::UpstreamInvalid(e.to_string()))?;
        let lowest = parsed.get("lowest_price").and_then(|v| v.as_str());
        Ok(lowest.and_then(parse_money_to_cents))
    }

    async fn listing_page_html(&self, appid: i64, market_hash_name: &str) -> Result<Option<String>, ScrapeError> {
        let encoded = urlencoding::encode(market_hash_name);
        let url = format!("https://steamcommunity.com/market/listings/{appid}/{encoded}");
        Ok(Some(self.get_via_proxy(url).await?))
    }

    async fn search_suggestions(&self, query: &str) -> Result<Vec<(String, i64)>, ScrapeError> {
        let encoded = urlencoding::encode(query);
        let url = format!("https://steamcommunity.com/market/searchsuggestionsresults?q={encoded}");
        let body = self.get_via_proxy(url).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScrapeError::UpstreamInvalid(e.to_string()))?;
        let results = parsed.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut out = Vec::new();
        for r in results {
            let Some(name) = r.get("name").and_then(|v| v.as_str()) else { continue };
            // Search-suggestions prices are integer cents already, per the marketplace API.
            let Some(price_cents) = r.get("sale_price_text")
                .and_then(|v| v.as_str())
                .and_then(parse_money_to_cents)
                .or_else(|| r.get("min_price").and_then(|v| v.as_i64()))
            else {
                continue;
            };
            out.push((name.to_string(), price_cents));
        }
        Ok(out)
    }
}
