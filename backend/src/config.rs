#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Relational store connection string (`sqlx::Any` — postgres or sqlite).
    pub database_url: String,
    /// Cache/stream broker connection string.
    pub redis_url: String,

    // =========================
    // Dispatcher configuration
    // =========================
    /// How often the sweep loop scans for dispatchable tasks and enqueues them.
    pub sweep_interval_secs: u64,
    /// Per-replica bound on concurrently executing tasks.
    pub worker_concurrency: usize,
    /// Cadence of the maintenance GC clearing stale in-flight dedup keys.
    pub maintenance_gc_interval_secs: u64,

    // =========================
    // Proxy pool configuration
    // =========================
    /// Minimum delay enforced between consecutive uses of the same proxy.
    pub proxy_min_delay_secs: i64,
    /// Cadence of the background revival probe loop under normal conditions.
    pub revival_interval_secs: u64,
    /// Faster cadence the revival loop switches to once more than half the active
    /// pool is quarantined.
    pub revival_fast_interval_secs: u64,

    // =========================
    // Retry configuration
    // =========================
    /// Maximum attempts `retry::with_retries` will make before giving up (floor 10).
    pub retry_max_attempts: usize,

    // =========================
    // Sticker / currency configuration
    // =========================
    pub sticker_appid: i64,
    pub sticker_inter_request_delay_ms: u64,

    // =========================
    // Notification configuration
    // =========================
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://scrape_dev.db".to_string());
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        Self {
            database_url,
            redis_url,

            sweep_interval_secs: env_u64("SWEEP_INTERVAL_SECS", 1),
            worker_concurrency: env_usize("WORKER_CONCURRENCY", 10),
            maintenance_gc_interval_secs: env_u64("MAINTENANCE_GC_INTERVAL_SECS", 300),

            proxy_min_delay_secs: env_u64("PROXY_MIN_DELAY_SECS", 1) as i64,
            revival_interval_secs: env_u64(
                "REVIVAL_INTERVAL_SECS",
                proxypool::constants::BACKGROUND_CHECK_INTERVAL_SECS,
            ),
            revival_fast_interval_secs: env_u64(
                "REVIVAL_FAST_INTERVAL_SECS",
                proxypool::constants::BACKGROUND_CHECK_INTERVAL_FAST_SECS,
            ),

            retry_max_attempts: env_usize("RETRY_MAX_ATTEMPTS", 50),

            sticker_appid: env_u64("STICKER_APPID", 730) as i64,
            sticker_inter_request_delay_ms: env_u64("STICKER_INTER_REQUEST_DELAY_MS", 400),

            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
