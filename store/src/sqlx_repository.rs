use std::time::Duration;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use crate::model::{FilterSpec, FoundItem, MonitoringTask, ParsedListing, Proxy};
use crate::repository::{FoundItemRepository, ProxyRepository, SettingsRepository, TaskRepository};

/// Wall-clock budgets for the C7 atomic counter update (spec §4.7/§5): 5s to execute the
/// `UPDATE`, 3s to commit it. Either timing out drops the transaction (implicit rollback)
/// rather than propagating — a lost counter increment is preferable to blocking a replica.
const COUNTER_EXECUTE_TIMEOUT: Duration = Duration::from_secs(5);
const COUNTER_COMMIT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct SqlxProxyRepository {
    pool: AnyPool,
}

impl SqlxProxyRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

fn row_to_proxy(row: &sqlx::any::AnyRow) -> anyhow::Result<Proxy> {
    Ok(Proxy {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        active: row.try_get::<i64, _>("active_i64")? != 0,
        base_delay_secs: row.try_get("base_delay_secs")?,
        success_count: row.try_get("success_count")?,
        failure_count: row.try_get("failure_count")?,
        consecutive_rate_limit_count: row.try_get("consecutive_rate_limit_count")?,
        last_used_ms: row.try_get("last_used_ms")?,
        blocked_since_ms: row.try_get("blocked_since_ms")?,
        blocked_until_ms: row.try_get("blocked_until_ms")?,
        last_error: row.try_get("last_error")?,
    })
}

const PROXY_COLUMNS: &str = r#"
id, url, CASE WHEN active THEN 1 ELSE 0 END AS active_i64,
base_delay_secs, success_count, failure_count, consecutive_rate_limit_count,
last_used_ms, blocked_since_ms, blocked_until_ms, last_error
"#;

#[async_trait]
impl ProxyRepository for SqlxProxyRepository {
    async fn list_active(&self) -> anyhow::Result<Vec<Proxy>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROXY_COLUMNS} FROM proxies WHERE active = TRUE"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_proxy).collect()
    }

    async fn list_all(&self) -> anyhow::Result<Vec<Proxy>> {
        let rows = sqlx::query(&format!("SELECT {PROXY_COLUMNS} FROM proxies"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_proxy).collect()
    }

    async fn find_by_url(&self, url: &str) -> anyhow::Result<Option<Proxy>> {
        let row = sqlx::query(&format!(
            "SELECT {PROXY_COLUMNS} FROM proxies WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_proxy).transpose()
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Proxy>> {
        let row = sqlx::query(&format!("SELECT {PROXY_COLUMNS} FROM proxies WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_proxy).transpose()
    }

    async fn insert(&self, url: &str, base_delay_secs: i64) -> anyhow::Result<Proxy> {
        let id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM proxies")
            .fetch_one(&self.pool)
            .await?;

        sqlx::query(
            r#"
INSERT INTO proxies
  (id, url, active, base_delay_secs, success_count, failure_count,
   consecutive_rate_limit_count, last_used_ms, blocked_since_ms, blocked_until_ms, last_error)
VALUES (?, ?, TRUE, ?, 0, 0, 0, NULL, NULL, NULL, NULL)
"#,
        )
        .bind(id)
        .bind(url)
        .bind(base_delay_secs)
        .execute(&self.pool)
        .await?;

        self.find_by_url(url)
            .await?
            .ok_or_else(|| anyhow::anyhow!("proxy vanished immediately after insert"))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM proxies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_used(&self, id: i64, now_ms: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE proxies SET last_used_ms = ? WHERE id = ?")
            .bind(now_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_success(&self, id: i64, now_ms: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE proxies
SET success_count = success_count + 1,
    consecutive_rate_limit_count = 0,
    blocked_since_ms = NULL,
    blocked_until_ms = NULL,
    last_used_ms = ?
WHERE id = ?
"#,
        )
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_rate_limited(
        &self,
        id: i64,
        blocked_since_ms: i64,
        blocked_until_ms: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE proxies
SET consecutive_rate_limit_count = consecutive_rate_limit_count + 1,
    blocked_since_ms = ?,
    blocked_until_ms = ?
WHERE id = ?
"#,
        )
        .bind(blocked_since_ms)
        .bind(blocked_until_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE proxies
SET failure_count = failure_count + 1, last_error = ?
WHERE id = ?
"#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE proxies SET active = FALSE WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct SqlxTaskRepository {
    pool: AnyPool,
}

impl SqlxTaskRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = r#"
id, name, market_hash_name, app_id, currency_code, filter_json,
CASE WHEN active THEN 1 ELSE 0 END AS active_i64,
check_interval_secs, last_check_ms, next_check_ms, total_checks, items_found
"#;

fn row_to_task(row: &sqlx::any::AnyRow) -> anyhow::Result<MonitoringTask> {
    let filter_json: String = row.try_get("filter_json")?;
    let filter: FilterSpec = serde_json::from_str(&filter_json)?;
    Ok(MonitoringTask {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        market_hash_name: row.try_get("market_hash_name")?,
        app_id: row.try_get("app_id")?,
        currency_code: row.try_get("currency_code")?,
        filter,
        active: row.try_get::<i64, _>("active_i64")? != 0,
        check_interval_secs: row.try_get("check_interval_secs")?,
        last_check_ms: row.try_get("last_check_ms")?,
        next_check_ms: row.try_get("next_check_ms")?,
        total_checks: row.try_get("total_checks")?,
        items_found: row.try_get("items_found")?,
    })
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn fetch_dispatchable(&self, now_ms: i64, limit: usize) -> anyhow::Result<Vec<MonitoringTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE active = TRUE AND next_check_ms <= ? \
             ORDER BY next_check_ms ASC LIMIT ?"
        ))
        .bind(now_ms)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn fetch_by_id(&self, id: i64) -> anyhow::Result<Option<MonitoringTask>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_all(&self) -> anyhow::Result<Vec<MonitoringTask>> {
        let rows = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM monitoring_tasks ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn insert(&self, task: &MonitoringTask) -> anyhow::Result<MonitoringTask> {
        let id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM monitoring_tasks")
            .fetch_one(&self.pool)
            .await?;
        let filter_json = serde_json::to_string(&task.filter)?;

        sqlx::query(
            r#"
INSERT INTO monitoring_tasks
  (id, name, market_hash_name, app_id, currency_code, filter_json, active,
   check_interval_secs, last_check_ms, next_check_ms, total_checks, items_found)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
"#,
        )
        .bind(id)
        .bind(&task.name)
        .bind(&task.market_hash_name)
        .bind(task.app_id)
        .bind(&task.currency_code)
        .bind(filter_json)
        .bind(task.active)
        .bind(task.check_interval_secs)
        .bind(task.last_check_ms)
        .bind(task.next_check_ms)
        .execute(&self.pool)
        .await?;

        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task vanished immediately after insert"))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM monitoring_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_next_check(&self, id: i64, next_check_ms: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE monitoring_tasks SET next_check_ms = ? WHERE id = ?")
            .bind(next_check_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_check(
        &self,
        id: i64,
        now_ms: i64,
        next_check_ms: i64,
        found_delta: i64,
    ) -> anyhow::Result<()> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(task_id = id, error = %e, "C7: failed to open counter-update transaction, skipping");
                return Ok(());
            }
        };

        let executed = tokio::time::timeout(
            COUNTER_EXECUTE_TIMEOUT,
            sqlx::query(
                r#"
UPDATE monitoring_tasks
SET total_checks = total_checks + 1,
    items_found = items_found + ?,
    last_check_ms = ?,
    next_check_ms = ?
WHERE id = ?
"#,
            )
            .bind(found_delta)
            .bind(now_ms)
            .bind(next_check_ms)
            .bind(id)
            .execute(&mut *tx),
        )
        .await;

        match executed {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::warn!(task_id = id, "C7: counter UPDATE exceeded 5s, rolling back and skipping");
                return Ok(()); // tx drops here, rolling back
            }
        }

        match tokio::time::timeout(COUNTER_COMMIT_TIMEOUT, tx.commit()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(task_id = id, "C7: counter commit exceeded 3s, counter increment lost");
                Ok(())
            }
        }
    }
}

pub struct SqlxFoundItemRepository {
    pool: AnyPool,
}

impl SqlxFoundItemRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

fn row_to_found_item(row: &sqlx::any::AnyRow) -> anyhow::Result<FoundItem> {
    let item_data_json: String = row.try_get("item_data_json")?;
    let item_data: ParsedListing = serde_json::from_str(&item_data_json)?;
    Ok(FoundItem {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        listing_id: row.try_get("listing_id")?,
        hash_name: row.try_get("hash_name")?,
        price_cents: row.try_get("price")?,
        item_data,
        inspect_link: row.try_get("inspect_link")?,
        notification_status: row.try_get("notification_status")?,
        discovered_at_ms: row.try_get("discovered_at_ms")?,
    })
}

#[async_trait]
impl FoundItemRepository for SqlxFoundItemRepository {
    async fn insert_if_new(&self, item: &FoundItem) -> anyhow::Result<bool> {
        // Worker replicas race on the same `(task_id, listing_id)` pair (Scenario B/
        // invariant 3) *and*, independently, on the hand-assigned `id` (no replica-safe
        // sequence under the `Any` driver). A unique-constraint error can mean either; a
        // bounded retry loop re-checks the business key to tell them apart rather than
        // assuming every violation is the intended duplicate-suppression case — silently
        // swallowing a genuine new row on an id collision would under-report matches.
        for _ in 0..5 {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM found_items WHERE task_id = ? AND listing_id = ?",
            )
            .bind(item.task_id)
            .bind(&item.listing_id)
            .fetch_optional(&self.pool)
            .await?;
            if existing.is_some() {
                return Ok(false);
            }

            let id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM found_items")
                .fetch_one(&self.pool)
                .await?;
            let item_data_json = serde_json::to_string(&item.item_data)?;

            let result = sqlx::query(
                r#"
INSERT INTO found_items
  (id, task_id, listing_id, hash_name, price, item_data_json, inspect_link,
   notification_status, discovered_at_ms)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
            )
            .bind(id)
            .bind(item.task_id)
            .bind(&item.listing_id)
            .bind(&item.hash_name)
            .bind(item.price_cents)
            .bind(item_data_json)
            .bind(&item.inspect_link)
            .bind(&item.notification_status)
            .bind(item.discovered_at_ms)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(true),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        // Exhausted retries under sustained id contention; the business-key check at the
        // top of the next caller's attempt is what actually enforces the invariant.
        Ok(false)
    }

    async fn list_for_task(&self, task_id: i64, limit: usize) -> anyhow::Result<Vec<FoundItem>> {
        let rows = sqlx::query(
            r#"
SELECT id, task_id, listing_id, hash_name, price, item_data_json, inspect_link,
       notification_status, discovered_at_ms
FROM found_items
WHERE task_id = ?
ORDER BY discovered_at_ms DESC
LIMIT ?
"#,
        )
        .bind(task_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_found_item).collect()
    }

    async fn purge_all(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM found_items").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn mark_notified(&self, id: i64, status: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE found_items SET notification_status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

pub struct SqlxSettingsRepository {
    pool: AnyPool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value_json FROM app_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value_json: &str) -> anyhow::Result<()> {
        let existing = self.get(key).await?;
        if existing.is_some() {
            sqlx::query("UPDATE app_settings SET value_json = ? WHERE key = ?")
                .bind(value_json)
                .bind(key)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO app_settings (key, value_json) VALUES (?, ?)")
                .bind(key)
                .bind(value_json)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
