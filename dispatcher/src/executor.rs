use async_trait::async_trait;

/// The actual scraping work a dispatched task triggers. Implemented by the binary's
/// composition root over the scraping pipeline — kept as a trait here so this crate
/// never depends on `scraper`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task_id: i64);
}
