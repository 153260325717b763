use async_trait::async_trait;

use crate::model::{FoundItem, MonitoringTask, Proxy};

#[async_trait]
pub trait ProxyRepository: Send + Sync {
    async fn list_active(&self) -> anyhow::Result<Vec<Proxy>>;
    async fn list_all(&self) -> anyhow::Result<Vec<Proxy>>;
    async fn find_by_url(&self, url: &str) -> anyhow::Result<Option<Proxy>>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Proxy>>;
    async fn insert(&self, url: &str, base_delay_secs: i64) -> anyhow::Result<Proxy>;
    async fn delete(&self, id: i64) -> anyhow::Result<()>;
    async fn touch_last_used(&self, id: i64, now_ms: i64) -> anyhow::Result<()>;

    /// Records a successful request: clears quarantine, resets the rate-limit streak,
    /// bumps `success_count`. A single atomic `UPDATE`, per the counter-contention
    /// discipline the rest of the system follows.
    async fn record_success(&self, id: i64, now_ms: i64) -> anyhow::Result<()>;

    /// Records a rate-limit incident and quarantines the proxy from `blocked_since_ms`
    /// until `blocked_until_ms`.
    async fn record_rate_limited(
        &self,
        id: i64,
        blocked_since_ms: i64,
        blocked_until_ms: i64,
    ) -> anyhow::Result<()>;

    /// Records a non-rate-limit failure, bumping `failure_count` and storing `error`.
    async fn record_failure(&self, id: i64, error: &str) -> anyhow::Result<()>;

    async fn deactivate(&self, id: i64) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn fetch_dispatchable(&self, now_ms: i64, limit: usize) -> anyhow::Result<Vec<MonitoringTask>>;
    async fn fetch_by_id(&self, id: i64) -> anyhow::Result<Option<MonitoringTask>>;
    async fn list_all(&self) -> anyhow::Result<Vec<MonitoringTask>>;
    async fn insert(&self, task: &MonitoringTask) -> anyhow::Result<MonitoringTask>;
    async fn delete(&self, id: i64) -> anyhow::Result<()>;
    async fn set_next_check(&self, id: i64, next_check_ms: i64) -> anyhow::Result<()>;

    /// Advances `last_check_ms`/`next_check_ms` and bumps `total_checks` by one and
    /// `items_found` by `found_delta`, all in a single `UPDATE` so concurrent workers
    /// never lose an increment.
    async fn record_check(
        &self,
        id: i64,
        now_ms: i64,
        next_check_ms: i64,
        found_delta: i64,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FoundItemRepository: Send + Sync {
    /// Inserts iff `(task_id, listing_id)` is not already present. Returns `false` on
    /// conflict rather than erroring, so the caller can treat it as "already reported".
    async fn insert_if_new(&self, item: &FoundItem) -> anyhow::Result<bool>;
    async fn list_for_task(&self, task_id: i64, limit: usize) -> anyhow::Result<Vec<FoundItem>>;
    async fn purge_all(&self) -> anyhow::Result<u64>;
    async fn mark_notified(&self, id: i64, status: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value_json: &str) -> anyhow::Result<()>;
}
