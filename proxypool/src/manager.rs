use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::time::now_ms;
use common::{Cache, ScrapeError};
use store::{Proxy, ProxyRepository, SettingsRepository};
use tokio::sync::Mutex;

use crate::constants::*;
use crate::normalize::normalize_proxy_url;

/// Notified when every active proxy is simultaneously quarantined. Kept as a small local
/// trait rather than a dependency on the notification crate so the pool never depends on
/// the thing it is reporting into.
#[async_trait]
pub trait AllQuarantinedSink: Send + Sync {
    async fn notify(&self, quarantined: usize, total: usize);
}

pub struct NoopAlertSink;

#[async_trait]
impl AllQuarantinedSink for NoopAlertSink {
    async fn notify(&self, _quarantined: usize, _total: usize) {}
}

/// A proxy currently held by one caller. Dropping this without calling `release` leaks the
/// reservation only until its 5 minute cache TTL expires — a deliberate crash-safety net.
pub struct ReservedProxy {
    pub proxy: Proxy,
    reservation_key: String,
}

pub struct ProxyPoolManager {
    repo: Arc<dyn ProxyRepository>,
    cache: Arc<dyn Cache>,
    settings: Arc<dyn SettingsRepository>,
    alert_sink: Arc<dyn AllQuarantinedSink>,
    // Serializes cursor read-then-advance within this process; reservation itself is
    // cross-process via the cache's SET NX EX, so this lock is never held across a sleep.
    cursor_guard: Mutex<()>,
}

impl ProxyPoolManager {
    pub fn new(
        repo: Arc<dyn ProxyRepository>,
        cache: Arc<dyn Cache>,
        settings: Arc<dyn SettingsRepository>,
        alert_sink: Arc<dyn AllQuarantinedSink>,
    ) -> Self {
        Self {
            repo,
            cache,
            settings,
            alert_sink,
            cursor_guard: Mutex::new(()),
        }
    }

    pub async fn add_proxy(&self, raw_url: &str, base_delay_secs: i64) -> anyhow::Result<Proxy> {
        let canonical = normalize_proxy_url(raw_url);
        if let Some(existing) = self.repo.find_by_url(&canonical).await? {
            return Ok(existing);
        }
        self.repo.insert(&canonical, base_delay_secs).await
    }

    fn in_use_key(proxy_id: i64) -> String {
        format!("{CACHE_KEY_IN_USE_PREFIX}{proxy_id}")
    }

    fn candidate_usable(p: &Proxy, now: i64, min_delay_secs: i64) -> bool {
        if p.is_quarantined(now) && !p.eligible_for_early_release(now, EARLY_UNBLOCK_THRESHOLD_SECS) {
            return false;
        }
        let required_delay = p.base_delay_secs.max(min_delay_secs);
        match p.last_used_ms {
            Some(last) => now - last >= required_delay * 1000,
            None => true,
        }
    }

    /// Selects and reserves a proxy. Tries a handful of rotation passes, sleeping between
    /// them only when every candidate is merely pacing (not quarantined/reserved), since a
    /// pacing wait is guaranteed to resolve; gives up after a bounded number of passes.
    pub async fn acquire(&self, min_delay_secs: i64) -> Result<ReservedProxy, ScrapeError> {
        const MAX_ATTEMPTS: usize = 6;

        for attempt in 0..MAX_ATTEMPTS {
            let candidates = self
                .repo
                .list_active()
                .await
                .map_err(|e| ScrapeError::PersistenceTimeout(e.to_string()))?;

            if candidates.is_empty() {
                return Err(ScrapeError::ProxyUnavailable);
            }

            self.maybe_alert_all_quarantined(&candidates).await;

            let n = candidates.len();
            let cursor = {
                let _guard = self.cursor_guard.lock().await;
                self.read_cursor().await.unwrap_or(0)
            };

            let now = now_ms();
            let mut best_wait: Option<i64> = None;

            for i in 0..n {
                let idx = (cursor + 1 + i) % n;
                let candidate = &candidates[idx];

                if !Self::candidate_usable(candidate, now, min_delay_secs) {
                    continue;
                }

                let key = Self::in_use_key(candidate.id);
                let reserved = self
                    .cache
                    .set_nx_ex(&key, "1", RESERVATION_TTL_SECS)
                    .await
                    .unwrap_or(true); // cache degraded: proceed best-effort, single-process safety only

                if !reserved {
                    continue;
                }

                self.advance_cursor(idx).await;
                // Pacing applies to every dispatch, not just successful ones, so a proxy
                // that keeps failing is still subject to its minimum delay between uses.
                if let Err(e) = self.repo.touch_last_used(candidate.id, now).await {
                    tracing::warn!(error = %e, proxy_id = candidate.id, "failed to record proxy use, pacing may be skipped next round");
                }
                return Ok(ReservedProxy {
                    proxy: candidate.clone(),
                    reservation_key: key,
                });
            }

            // Nothing usable right now; find the soonest a currently-pacing candidate will
            // free up and sleep that long before retrying.
            for p in &candidates {
                if p.is_quarantined(now) && !p.eligible_for_early_release(now, EARLY_UNBLOCK_THRESHOLD_SECS) {
                    continue;
                }
                let required_delay = p.base_delay_secs.max(min_delay_secs) * 1000;
                let wait = match p.last_used_ms {
                    Some(last) => (required_delay - (now - last)).max(0),
                    None => 0,
                };
                if best_wait.map(|w| wait < w).unwrap_or(true) {
                    best_wait = Some(wait);
                }
            }

            match best_wait {
                Some(wait_ms) if wait_ms > 0 && attempt + 1 < MAX_ATTEMPTS => {
                    tokio::time::sleep(Duration::from_millis(wait_ms.min(5_000) as u64)).await;
                }
                Some(_) => continue,
                None => return Err(ScrapeError::ProxyUnavailable),
            }
        }

        Err(ScrapeError::ProxyUnavailable)
    }

    pub async fn release(&self, reserved: &ReservedProxy) {
        if let Err(e) = self.cache.del(&reserved.reservation_key).await {
            tracing::warn!(error = %e, proxy_id = reserved.proxy.id, "failed to release proxy reservation");
        }
    }

    pub async fn report_success(&self, proxy_id: i64) -> anyhow::Result<()> {
        self.repo.record_success(proxy_id, now_ms()).await
    }

    /// Escalates quarantine duration on the third consecutive rate-limit incident,
    /// mirroring the source's `MAX_429_ERRORS_BEFORE_LONG_BLOCK` threshold.
    pub async fn report_rate_limited(&self, proxy_id: i64) -> anyhow::Result<()> {
        let current = self.repo.find_by_id(proxy_id).await?;
        let next_count = current
            .as_ref()
            .map(|p| p.consecutive_rate_limit_count + 1)
            .unwrap_or(1);

        let duration_secs = if next_count >= MAX_429_ERRORS_BEFORE_LONG_BLOCK {
            BLOCK_DURATION_429_MULTIPLE_SECS
        } else {
            BLOCK_DURATION_429_FIRST_SECS
        };

        let now = now_ms();
        self.repo
            .record_rate_limited(proxy_id, now, now + duration_secs * 1000)
            .await
    }

    pub async fn report_failure(&self, proxy_id: i64, error: &str) -> anyhow::Result<()> {
        self.repo.record_failure(proxy_id, error).await?;
        if let Some(p) = self.repo.find_by_id(proxy_id).await?
            && p.should_deactivate()
        {
            self.repo.deactivate(proxy_id).await?;
        }
        Ok(())
    }

    async fn read_cursor(&self) -> Option<usize> {
        self.cache
            .get(CACHE_KEY_LAST_INDEX)
            .await
            .ok()
            .flatten()
            .and_then(|s| s.parse().ok())
    }

    async fn advance_cursor(&self, idx: usize) {
        let _ = self
            .cache
            .setex(CACHE_KEY_LAST_INDEX, &idx.to_string(), 86_400)
            .await;
    }

    async fn maybe_alert_all_quarantined(&self, candidates: &[Proxy]) {
        let now = now_ms();
        let quarantined = candidates.iter().filter(|p| p.is_quarantined(now)).count();
        if quarantined == 0 || quarantined < candidates.len() {
            return;
        }

        let last_alert_ms: i64 = self
            .settings
            .get(SETTING_KEY_ALL_QUARANTINED_ALERT_AT)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if now - last_alert_ms < NOTIFICATION_COOLDOWN_SECS * 1000 {
            return;
        }

        self.alert_sink.notify(quarantined, candidates.len()).await;
        let _ = self
            .settings
            .set(SETTING_KEY_ALL_QUARANTINED_ALERT_AT, &now.to_string())
            .await;
    }
}
