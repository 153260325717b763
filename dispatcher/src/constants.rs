pub const STREAM_NAME: &str = "stream:parsing_tasks";
pub const CONSUMER_GROUP: &str = "parsing_workers";
pub const STREAM_MAXLEN: usize = 10_000;

pub const SWEEP_BATCH_SIZE: usize = 100;

pub const DEFAULT_WORKER_CONCURRENCY: usize = 10;
pub const READ_BLOCK_MS: usize = 1_000;
pub const READ_COUNT: usize = 16;

pub const RUNNING_KEY_PREFIX: &str = "parsing_task_running:";
pub const RUNNING_KEY_TTL_SECS: u64 = 7_200;

pub const WAKE_CHANNEL: &str = "parsing_tasks:wake";
