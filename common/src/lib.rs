pub mod cache;
pub mod error;
pub mod logger;
pub mod stream;
pub mod time;

pub use cache::{Cache, InMemoryCache, RedisCache};
pub use error::ScrapeError;
pub use logger::{TraceId, init_tracing, warn_if_slow};
pub use stream::{RedisStreamBroker, StreamBroker, StreamMessage};
