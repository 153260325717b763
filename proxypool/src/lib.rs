pub mod constants;
pub mod manager;
pub mod normalize;
pub mod revival;

pub use manager::{AllQuarantinedSink, NoopAlertSink, ProxyPoolManager, ReservedProxy};
pub use normalize::normalize_proxy_url;
pub use revival::run_revival_loop;
