use thiserror::Error;

/// Error kinds shared across every crate that touches proxies, the relational store or the
/// cache/stream broker. Crate-local error types convert into this at their public boundary;
/// `anyhow::Error` takes over at the binary/CLI level.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("upstream responded with a rate-limit signal")]
    RateLimited,

    #[error("no usable proxy is currently available")]
    ProxyUnavailable,

    #[error("retry budget exhausted without a successful response")]
    ProxyExhausted,

    #[error("upstream request failed transiently: {0}")]
    UpstreamTransient(String),

    #[error("upstream response could not be parsed: {0}")]
    UpstreamInvalid(String),

    #[error("filter evaluation skipped: {0}")]
    FilterEvaluationSkipped(String),

    #[error("persistence operation timed out: {0}")]
    PersistenceTimeout(String),

    #[error("persistence operation hit a write conflict: {0}")]
    PersistenceConflict(String),

    #[error("cache/stream broker degraded: {0}")]
    CacheDegraded(String),
}

impl From<redis::RedisError> for ScrapeError {
    fn from(e: redis::RedisError) -> Self {
        ScrapeError::CacheDegraded(e.to_string())
    }
}
