use std::sync::Arc;
use std::time::Duration;

use common::time::now_ms;
use common::Cache;
use futures::stream::{self, StreamExt};
use store::ProxyRepository;

use crate::constants::*;
use crate::manager::ProxyPoolManager;

/// Probes a quarantined proxy against a cheap upstream endpoint. Success clears the
/// proxy's quarantine via the manager; failure is silent (the proxy stays quarantined
/// until its TTL or the next cycle).
async fn probe_one(client: &reqwest::Client, probe_url: &str, proxy_url: &str) -> bool {
    let Ok(proxy) = reqwest::Proxy::all(proxy_url) else {
        return false;
    };
    let Ok(c) = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(Duration::from_secs(BACKGROUND_CHECK_TIMEOUT_SECS))
        .build()
    else {
        return false;
    };
    let _ = client; // base client unused for probing; kept for symmetry with the caller's pool
    c.get(probe_url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
}

/// Background revival loop: periodically probes quarantined proxies, oldest block first,
/// in bounded concurrent groups, and clears quarantine on a successful probe. Interval
/// collapses from 300s to 60s when more than half the active pool is quarantined.
pub async fn run_revival_loop(
    manager: Arc<ProxyPoolManager>,
    repo: Arc<dyn ProxyRepository>,
    cache: Arc<dyn Cache>,
    probe_url: String,
    normal_interval_secs: u64,
    fast_interval_secs: u64,
) {
    let client = reqwest::Client::new();

    loop {
        // Multiple replicas may run this loop; the shared "last smart check" key lets only
        // one of them actually probe per interval, the rest skip and sleep the short interval.
        let claimed = cache
            .set_nx_ex(CACHE_KEY_LAST_SMART_CHECK, "1", fast_interval_secs)
            .await
            .unwrap_or(true);
        if !claimed {
            tokio::time::sleep(Duration::from_secs(fast_interval_secs)).await;
            continue;
        }

        let active = match repo.list_active().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "revival loop: failed to list proxies");
                tokio::time::sleep(Duration::from_secs(normal_interval_secs)).await;
                continue;
            }
        };

        let now = now_ms();
        let mut quarantined: Vec<_> = active.iter().filter(|p| p.is_quarantined(now)).collect();
        quarantined.sort_by_key(|p| p.blocked_until_ms.unwrap_or(i64::MAX));

        let fraction_quarantined = if active.is_empty() {
            0.0
        } else {
            quarantined.len() as f64 / active.len() as f64
        };

        let results: Vec<(i64, bool)> = stream::iter(quarantined.iter().map(|p| {
            let client = client.clone();
            let probe_url = probe_url.clone();
            let url = p.url.clone();
            let id = p.id;
            async move { (id, probe_one(&client, &probe_url, &url).await) }
        }))
        .buffer_unordered(BACKGROUND_CHECK_MAX_CONCURRENT)
        .collect()
        .await;

        for (id, ok) in results {
            if ok {
                if let Err(e) = manager.report_success(id).await {
                    tracing::warn!(error = %e, proxy_id = id, "revival: failed to clear quarantine");
                } else {
                    tracing::info!(proxy_id = id, "revival: proxy unquarantined");
                }
            }
        }

        let interval = if fraction_quarantined > BLOCKED_PROXIES_THRESHOLD_FOR_FAST_CHECK {
            fast_interval_secs
        } else {
            normal_interval_secs
        };
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}
