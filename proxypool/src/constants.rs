//! Quarantine/revival tuning. Pinned to the values the source proxy manager actually
//! guards with named constants, not the inconsistent cadence mentioned only in comments.

pub const BLOCK_DURATION_429_FIRST_SECS: i64 = 600;
pub const BLOCK_DURATION_429_MULTIPLE_SECS: i64 = 3600;
pub const MAX_429_ERRORS_BEFORE_LONG_BLOCK: i64 = 3;
pub const EARLY_UNBLOCK_THRESHOLD_SECS: i64 = 300;

pub const BACKGROUND_CHECK_INTERVAL_SECS: u64 = 300;
pub const BACKGROUND_CHECK_INTERVAL_FAST_SECS: u64 = 60;
pub const BACKGROUND_CHECK_TIMEOUT_SECS: u64 = 8;
pub const BACKGROUND_CHECK_MAX_CONCURRENT: usize = 20;
pub const BLOCKED_PROXIES_THRESHOLD_FOR_FAST_CHECK: f64 = 0.5;

pub const RESERVATION_TTL_SECS: u64 = 300;
pub const NOTIFICATION_COOLDOWN_SECS: i64 = 1800;

pub const CACHE_KEY_LAST_INDEX: &str = "proxy:last_index";
pub const CACHE_KEY_IN_USE_PREFIX: &str = "proxy:in_use:";
pub const CACHE_KEY_LAST_SMART_CHECK: &str = "proxy:last_smart_check";
pub const SETTING_KEY_ALL_QUARANTINED_ALERT_AT: &str = "proxy_pool:all_quarantined_alert_at_ms";
