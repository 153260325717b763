use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub id: i64,
    pub url: String,
    pub active: bool,
    pub base_delay_secs: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub consecutive_rate_limit_count: i64,
    pub last_used_ms: Option<i64>,
    pub blocked_since_ms: Option<i64>,
    pub blocked_until_ms: Option<i64>,
    pub last_error: Option<String>,
}

impl Proxy {
    pub fn is_quarantined(&self, now_ms: i64) -> bool {
        self.blocked_until_ms.map(|b| b > now_ms).unwrap_or(false)
    }

    /// `proxy_manager.py`'s early-unblock allowance: a quarantined proxy becomes usable
    /// again once 300s have elapsed since the block started, on the hypothesis that the
    /// upstream limit has likely lifted before the full quarantine window expires.
    pub fn eligible_for_early_release(&self, now_ms: i64, threshold_secs: i64) -> bool {
        match self.blocked_since_ms {
            Some(since) => now_ms - since >= threshold_secs * 1000,
            None => false,
        }
    }

    /// Source `proxy_manager.py`'s deactivation guard: 20 consecutive non-rate-limit
    /// failures deactivate the proxy unless it has succeeded more than 3x as often as
    /// it has failed.
    pub fn should_deactivate(&self) -> bool {
        self.failure_count >= 20 && self.success_count <= self.failure_count.saturating_mul(3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StickerFilter {
    TotalPriceRange { min_cents: Option<i64>, max_cents: Option<i64> },
    MinTotalStickersPrice { min_cents: i64 },
    MaxOverpayCoefficient { k: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterSpec {
    pub exact_name: Option<String>,
    pub float_range: Option<(f64, f64)>,
    pub patterns: Option<Vec<i32>>,
    pub max_price_cents: Option<i64>,
    pub sticker_filter: Option<StickerFilter>,
    /// When the task's `market_hash_name` is ambiguous (no wear suffix), this narrows the
    /// concrete wear variants discovered via search suggestions to the ones the user
    /// actually wants monitored. `None` processes every variant the marketplace returns.
    pub enabled_variants: Option<Vec<String>>,
    /// User-supplied clean-item reference price `D` for `MaxOverpayCoefficient`. When unset,
    /// the pipeline auto-derives it from the lowest-priced sticker-free listing seen in the
    /// same scrape.
    pub clean_reference_price_cents: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MonitoringTask {
    pub id: i64,
    pub name: String,
    pub market_hash_name: String,
    pub app_id: i64,
    pub currency_code: String,
    pub filter: FilterSpec,
    pub active: bool,
    pub check_interval_secs: i64,
    pub last_check_ms: Option<i64>,
    pub next_check_ms: i64,
    pub total_checks: i64,
    pub items_found: i64,
}

impl MonitoringTask {
    pub fn is_dispatchable(&self, now_ms: i64) -> bool {
        self.active && self.next_check_ms <= now_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickerInfo {
    pub position: u32,
    pub name: String,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedListing {
    pub listing_id: String,
    pub price_cents: i64,
    pub float_value: Option<f64>,
    pub pattern: Option<i32>,
    pub stickers: Vec<StickerInfo>,
    pub inspect_link: Option<String>,
    pub total_stickers_price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct FoundItem {
    pub id: i64,
    pub task_id: i64,
    pub listing_id: String,
    pub hash_name: String,
    pub price_cents: i64,
    pub item_data: ParsedListing,
    pub inspect_link: Option<String>,
    pub notification_status: String,
    pub discovered_at_ms: i64,
}
