use std::sync::Arc;
use std::time::Duration;

use common::time::now_ms;
use common::{Cache, StreamBroker};
use serde::{Deserialize, Serialize};
use store::TaskRepository;
use tokio::sync::Semaphore;

use crate::constants::*;
use crate::executor::TaskExecutor;

#[derive(Debug, Serialize, Deserialize)]
struct TaskMessage {
    task_id: i64,
}

fn running_key(task_id: i64) -> String {
    format!("{RUNNING_KEY_PREFIX}{task_id}")
}

/// Scans dispatchable tasks and appends one stream entry per task not already in flight.
/// Runs on a fixed cadence independent of any per-task `check_interval_secs` — the sweep
/// interval only bounds dispatch latency, `next_check_ms` bounds dispatch frequency.
pub async fn run_sweep_loop(
    task_repo: Arc<dyn TaskRepository>,
    cache: Arc<dyn Cache>,
    broker: Arc<dyn StreamBroker>,
    sweep_interval: Duration,
) {
    if let Err(e) = broker.ensure_group(STREAM_NAME, CONSUMER_GROUP).await {
        tracing::error!(error = %e, "dispatcher: failed to ensure consumer group, sweep loop exiting");
        return;
    }

    loop {
        match task_repo.fetch_dispatchable(now_ms(), SWEEP_BATCH_SIZE).await {
            Ok(tasks) => {
                for task in tasks {
                    if let Err(e) = try_dispatch_one(&task_repo, &cache, &broker, task.id).await {
                        tracing::warn!(task_id = task.id, error = %e, "dispatcher: failed to enqueue task");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "dispatcher: failed to list dispatchable tasks"),
        }
        tokio::time::sleep(sweep_interval).await;
    }
}

async fn try_dispatch_one(
    _task_repo: &Arc<dyn TaskRepository>,
    cache: &Arc<dyn Cache>,
    broker: &Arc<dyn StreamBroker>,
    task_id: i64,
) -> anyhow::Result<()> {
    let key = running_key(task_id);
    let claimed = cache.set_nx_ex(&key, "1", RUNNING_KEY_TTL_SECS).await?;
    if !claimed {
        // Already in flight (or the previous run's dedup key hasn't expired yet).
        return Ok(());
    }

    let payload = serde_json::to_string(&TaskMessage { task_id })?;
    broker.xadd(STREAM_NAME, &payload, STREAM_MAXLEN).await?;
    let _ = cache.publish(WAKE_CHANNEL, &task_id.to_string()).await;
    Ok(())
}

/// Consumes the stream with a bounded semaphore so at most `concurrency` tasks run at
/// once per replica, acking and clearing the in-flight dedup key only after the
/// executor's `execute` future completes (success or panic-unwind-caught failure).
pub async fn run_worker_loop(
    consumer_id: String,
    concurrency: usize,
    cache: Arc<dyn Cache>,
    broker: Arc<dyn StreamBroker>,
    executor: Arc<dyn TaskExecutor>,
) {
    if let Err(e) = broker.ensure_group(STREAM_NAME, CONSUMER_GROUP).await {
        tracing::error!(error = %e, "dispatcher: failed to ensure consumer group, worker loop exiting");
        return;
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    loop {
        let messages = match broker
            .xreadgroup(STREAM_NAME, CONSUMER_GROUP, &consumer_id, READ_COUNT, READ_BLOCK_MS)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "dispatcher: stream read failed");
                tokio::time::sleep(Duration::from_millis(READ_BLOCK_MS as u64)).await;
                continue;
            }
        };

        for msg in messages {
            let Ok(parsed) = serde_json::from_str::<TaskMessage>(&msg.payload) else {
                tracing::warn!(id = %msg.id, "dispatcher: dropping malformed stream message");
                let _ = broker.xack(STREAM_NAME, CONSUMER_GROUP, &msg.id).await;
                continue;
            };

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let cache = cache.clone();
            let broker = broker.clone();
            let executor = executor.clone();
            let id = msg.id.clone();

            tokio::spawn(async move {
                let _permit = permit;
                executor.execute(parsed.task_id).await;
                let _ = cache.del(&running_key(parsed.task_id)).await;
                if let Err(e) = broker.xack(STREAM_NAME, CONSUMER_GROUP, &id).await {
                    tracing::warn!(error = %e, "dispatcher: failed to ack stream message");
                }
            });
        }
    }
}

/// Best-effort maintenance sweep clearing `parsing_task_running:*` keys whose task no
/// longer exists or is inactive, so a deleted/disabled task cannot permanently keep a
/// stale in-flight marker around for its full TTL window. The TTL itself is still the
/// correctness backstop; this only tightens latency.
pub async fn run_maintenance_gc(
    task_repo: Arc<dyn TaskRepository>,
    cache: Arc<dyn Cache>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        let Ok(keys) = cache.scan_prefix(RUNNING_KEY_PREFIX).await else {
            continue;
        };
        for key in keys {
            let Some(id_str) = key.strip_prefix(RUNNING_KEY_PREFIX) else {
                continue;
            };
            let Ok(task_id) = id_str.parse::<i64>() else {
                continue;
            };
            match task_repo.fetch_by_id(task_id).await {
                Ok(Some(task)) if task.active => {}
                _ => {
                    let _ = cache.del(&key).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{InMemoryCache, StreamMessage};
    use tokio::sync::Mutex as TMutex;

    #[derive(Default)]
    struct MockBroker {
        entries: TMutex<Vec<String>>,
    }

    #[async_trait]
    impl StreamBroker for MockBroker {
        async fn ensure_group(&self, _stream: &str, _group: &str) -> Result<(), common::ScrapeError> {
            Ok(())
        }
        async fn xadd(&self, _stream: &str, payload: &str, _maxlen: usize) -> Result<String, common::ScrapeError> {
            let mut guard = self.entries.lock().await;
            guard.push(payload.to_string());
            Ok(guard.len().to_string())
        }
        async fn xreadgroup(
            &self,
            _stream: &str,
            _group: &str,
            _consumer: &str,
            _count: usize,
            _block_ms: usize,
        ) -> Result<Vec<StreamMessage>, common::ScrapeError> {
            Ok(vec![])
        }
        async fn xack(&self, _stream: &str, _group: &str, _id: &str) -> Result<(), common::ScrapeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_task_already_in_flight_is_not_re_enqueued() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let concrete_broker = Arc::new(MockBroker::default());
        let broker: Arc<dyn StreamBroker> = concrete_broker.clone();
        let repo: Arc<dyn TaskRepository> = Arc::new(NoopTaskRepo);

        try_dispatch_one(&repo, &cache, &broker, 7).await.unwrap();
        try_dispatch_one(&repo, &cache, &broker, 7).await.unwrap();

        assert_eq!(concrete_broker.entries.lock().await.len(), 1);
    }

    struct NoopTaskRepo;

    #[async_trait]
    impl TaskRepository for NoopTaskRepo {
        async fn fetch_dispatchable(&self, _now_ms: i64, _limit: usize) -> anyhow::Result<Vec<store::MonitoringTask>> {
            Ok(vec![])
        }
        async fn fetch_by_id(&self, _id: i64) -> anyhow::Result<Option<store::MonitoringTask>> {
            Ok(None)
        }
        async fn list_all(&self) -> anyhow::Result<Vec<store::MonitoringTask>> {
            Ok(vec![])
        }
        async fn insert(&self, task: &store::MonitoringTask) -> anyhow::Result<store::MonitoringTask> {
            Ok(task.clone())
        }
        async fn delete(&self, _id: i64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn set_next_check(&self, _id: i64, _next_check_ms: i64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn record_check(
            &self,
            _id: i64,
            _now_ms: i64,
            _next_check_ms: i64,
            _found_delta: i64,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
