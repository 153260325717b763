use std::sync::Arc;
use std::time::Duration;

use common::ScrapeError;
use proxypool::ProxyPoolManager;

use crate::{Outcome, RetryConfig, with_retries};

/// `GET url` rotated across the proxy pool via [`with_retries`], classifying HTTP 429 and
/// the upstream's textual "Too Many Requests" body as a rate-limit signal. Shared by every
/// subsystem that reads the marketplace through a proxy (the scraping pipeline, the
/// sticker resolver, the currency service's primary source).
pub async fn get_via_proxy(
    pool: &Arc<ProxyPoolManager>,
    retry_cfg: &RetryConfig,
    timeout: Duration,
    user_agent: &str,
    url: &str,
) -> Result<String, ScrapeError> {
    let user_agent = user_agent.to_string();
    let url = url.to_string();

    with_retries(pool, retry_cfg, move |proxy| {
        let user_agent = user_agent.clone();
        let url = url.clone();
        async move {
            let proxy_handle = match reqwest::Proxy::all(&proxy.url) {
                Ok(p) => p,
                Err(e) => return Outcome::OtherFailure(e.to_string()),
            };
            let client = match reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .proxy(proxy_handle)
                .build()
            {
                Ok(c) => c,
                Err(e) => return Outcome::OtherFailure(e.to_string()),
            };

            match client.get(&url).send().await {
                Ok(resp) if resp.status().as_u16() == 429 => Outcome::RateLimited,
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(body) if body.contains("Too Many Requests") => Outcome::RateLimited,
                    Ok(body) => Outcome::Success(body),
                    Err(e) => Outcome::OtherFailure(e.to_string()),
                },
                Ok(resp) => Outcome::OtherFailure(format!("status {}", resp.status())),
                Err(e) => Outcome::OtherFailure(e.to_string()),
            }
        }
    })
    .await
}
