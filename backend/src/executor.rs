use std::sync::Arc;

use async_trait::async_trait;
use dispatcher::TaskExecutor;
use scraper_pipeline::ScrapePipeline;
use store::TaskRepository;

/// Bridges the dispatcher's opaque `execute(task_id)` call to the scraping pipeline,
/// which operates on a fully-loaded `MonitoringTask`. A task that vanished (deleted
/// between enqueue and dispatch) or failed to load is logged and otherwise a no-op —
/// the dispatcher still acks the stream message either way.
pub struct PipelineTaskExecutor {
    task_repo: Arc<dyn TaskRepository>,
    pipeline: Arc<ScrapePipeline>,
}

impl PipelineTaskExecutor {
    pub fn new(task_repo: Arc<dyn TaskRepository>, pipeline: Arc<ScrapePipeline>) -> Self {
        Self { task_repo, pipeline }
    }
}

#[async_trait]
impl TaskExecutor for PipelineTaskExecutor {
    async fn execute(&self, task_id: i64) {
        match self.task_repo.fetch_by_id(task_id).await {
            Ok(Some(task)) => self.pipeline.run_task(&task).await,
            Ok(None) => tracing::warn!(task_id, "executor: dispatched task no longer exists"),
            Err(e) => tracing::error!(task_id, error = %e, "executor: failed to load dispatched task"),
        }
    }
}
