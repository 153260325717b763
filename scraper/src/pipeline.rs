use std::collections::HashMap;
use std::sync::Arc;

use common::time::now_ms;
use common::Cache;
use notify_dispatch::{MatchFoundEvent, NotificationDispatcher};
use store::{FilterSpec, FoundItem, FoundItemRepository, MonitoringTask, ParsedListing, TaskRepository};
use stickers::StickerPriceResolver;

use crate::client::{MarketplaceClient, PAGE_SIZE};
use crate::filters;
use crate::parse::parse_render_page;
use crate::variant::resolve_variants;

const DEDUP_TTL_SECS: u64 = 24 * 3600;

fn dedup_key(listing_id: &str) -> String {
    format!("parsed_item:{listing_id}")
}

/// The per-task orchestrator (C4): variant expansion, paged fetch, dedup, sticker-price
/// enrichment, filter application, and result emission — followed unconditionally by the
/// atomic post-task bookkeeping write the dispatcher's ack waits on.
pub struct ScrapePipeline {
    client: Arc<dyn MarketplaceClient>,
    sticker_resolver: Arc<StickerPriceResolver>,
    cache: Arc<dyn Cache>,
    task_repo: Arc<dyn TaskRepository>,
    found_item_repo: Arc<dyn FoundItemRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl ScrapePipeline {
    pub fn new(
        client: Arc<dyn MarketplaceClient>,
        sticker_resolver: Arc<StickerPriceResolver>,
        cache: Arc<dyn Cache>,
        task_repo: Arc<dyn TaskRepository>,
        found_item_repo: Arc<dyn FoundItemRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            client,
            sticker_resolver,
            cache,
            task_repo,
            found_item_repo,
            notifier,
        }
    }

    /// Runs one dispatched task to completion. Every internal failure is logged and
    /// swallowed here rather than propagated — bookkeeping commits (and the stream ack
    /// that follows it) regardless of how the scrape itself went.
    pub async fn run_task(&self, task: &MonitoringTask) {
        let variants = match resolve_variants(self.client.as_ref(), &task.market_hash_name, &task.filter).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(task_id = task.id, error = %e, "scraper: variant resolution failed");
                Vec::new()
            }
        };

        let mut items_found = 0i64;
        for variant_name in &variants {
            match self.scrape_variant(task, variant_name).await {
                Ok(found) => items_found += found,
                Err(e) => tracing::warn!(task_id = task.id, variant = %variant_name, error = %e, "scraper: variant scrape failed"),
            }
        }

        let now = now_ms();
        let next_check = now + task.check_interval_secs * 1000;
        if let Err(e) = self.task_repo.record_check(task.id, now, next_check, items_found).await {
            tracing::error!(task_id = task.id, error = %e, "scraper: post-task bookkeeping write failed");
        }
    }

    async fn scrape_variant(&self, task: &MonitoringTask, hash_name: &str) -> anyhow::Result<i64> {
        let mut listings = Vec::new();
        let mut start = 0u32;
        let mut total_count: Option<u64> = None;

        loop {
            let page = self
                .client
                .fetch_render_page(task.app_id, hash_name, start, &task.currency_code)
                .await?;
            if total_count.is_none() {
                total_count = Some(page.total_count);
            }
            let page_listings = parse_render_page(&page);
            let page_len = page_listings.len();
            listings.extend(page_listings);

            start += PAGE_SIZE;
            let exhausted_by_count = total_count.map(|n| start as u64 >= n).unwrap_or(false);
            if page_len < PAGE_SIZE as usize || exhausted_by_count {
                break;
            }
        }

        let auto_clean_reference = listings
            .iter()
            .filter(|l| l.stickers.is_empty())
            .map(|l| l.price_cents)
            .min();
        let clean_reference = task.filter.clean_reference_price_cents.or(auto_clean_reference);

        let mut uncached: Vec<ParsedListing> = Vec::new();
        let mut ready: Vec<ParsedListing> = Vec::new();
        for listing in listings {
            match self.cache.get(&dedup_key(&listing.listing_id)).await {
                Ok(Some(cached_json)) => match serde_json::from_str::<ParsedListing>(&cached_json) {
                    Ok(cached) => ready.push(cached),
                    Err(_) => uncached.push(listing),
                },
                _ => uncached.push(listing),
            }
        }

        if task.filter.sticker_filter.is_some() && !uncached.is_empty() {
            let names: Vec<String> = uncached
                .iter()
                .flat_map(|l| l.stickers.iter().map(|s| s.name.clone()))
                .collect();
            if !names.is_empty() {
                let prices: HashMap<String, Option<i64>> = self.sticker_resolver.resolve_batch(&names).await;
                for listing in &mut uncached {
                    for sticker in &mut listing.stickers {
                        sticker.price_cents = prices.get(&sticker.name).copied().flatten();
                    }
                    listing.total_stickers_price_cents = listing
                        .stickers
                        .iter()
                        .map(|s| s.price_cents.unwrap_or(0))
                        .sum();
                }
            }
        } else {
            for listing in &mut uncached {
                listing.total_stickers_price_cents =
                    listing.stickers.iter().map(|s| s.price_cents.unwrap_or(0)).sum();
            }
        }

        for listing in &uncached {
            if let Ok(json) = serde_json::to_string(listing) {
                let _ = self.cache.setex(&dedup_key(&listing.listing_id), &json, DEDUP_TTL_SECS).await;
            }
        }

        ready.extend(uncached);

        let mut found = 0i64;
        for listing in &ready {
            found += self.evaluate_and_persist(task, hash_name, listing, &task.filter, clean_reference).await;
        }
        Ok(found)
    }

    async fn evaluate_and_persist(
        &self,
        task: &MonitoringTask,
        hash_name: &str,
        listing: &ParsedListing,
        filter: &FilterSpec,
        clean_reference_price_cents: Option<i64>,
    ) -> i64 {
        let passes = match filters::apply_filters(listing, hash_name, filter, clean_reference_price_cents) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(task_id = task.id, listing_id = %listing.listing_id, error = %e, "scraper: filter evaluation skipped");
                return 0;
            }
        };
        if !passes {
            return 0;
        }

        let item = FoundItem {
            id: 0,
            task_id: task.id,
            listing_id: listing.listing_id.clone(),
            hash_name: hash_name.to_string(),
            price_cents: listing.price_cents,
            item_data: listing.clone(),
            inspect_link: listing.inspect_link.clone(),
            notification_status: "pending".to_string(),
            discovered_at_ms: now_ms(),
        };

        match self.found_item_repo.insert_if_new(&item).await {
            Ok(true) => {
                let event = MatchFoundEvent {
                    task_name: task.name.clone(),
                    hash_name: hash_name.to_string(),
                    item,
                };
                self.notifier.notify_match(&event).await;
                1
            }
            Ok(false) => 0,
            Err(e) => {
                tracing::warn!(task_id = task.id, listing_id = %listing.listing_id, error = %e, "scraper: found-item insert failed");
                0
            }
        }
    }
}
