use async_trait::async_trait;

use crate::types::MatchFoundEvent;

/// Bounded fan-out to an external messenger. Interface only, per the spec's scope: the
/// relational store is the system of record and a failed notification never reverts the
/// `FoundItem` insert that triggered it.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_match(&self, event: &MatchFoundEvent);

    /// The single debounced alert proxy pool exhaustion surfaces (§4.1 Failure semantics).
    async fn notify_all_proxies_quarantined(&self, quarantined: usize, total: usize);
}

pub struct NoopNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopNotificationDispatcher {
    async fn notify_match(&self, _event: &MatchFoundEvent) {}
    async fn notify_all_proxies_quarantined(&self, _quarantined: usize, _total: usize) {}
}
