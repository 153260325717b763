use chrono::{DateTime, Utc};

/// Current wall-clock time truncated to millisecond precision, the unit every timestamp
/// column and cache TTL in this system is expressed in.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
