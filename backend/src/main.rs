use std::sync::Arc;
use std::time::Duration;

use backend::{config::AppConfig, executor::PipelineTaskExecutor};
use common::logger::init_tracing;
use common::{Cache, RedisCache, StreamBroker};
use currency::{CurrencyService, HttpRateFetcher};
use notify_dispatch::{NoopNotificationDispatcher, NotificationDispatcher, TelegramNotifier};
use proxypool::{AllQuarantinedSink, NoopAlertSink, ProxyPoolManager};
use retry::RetryConfig;
use scraper_pipeline::{ScrapePipeline, SteamMarketplaceClient};
use store::{Db, SqlxFoundItemRepository, SqlxProxyRepository, SqlxSettingsRepository, SqlxTaskRepository};
use store::{FoundItemRepository, ProxyRepository, SettingsRepository, TaskRepository};

/// Connects the redis-backed cache and stream broker. The cache degrades to an
/// in-process fallback when redis is unreachable (cross-replica reservation/dedup no
/// longer hold, but a single replica keeps running); the stream broker has no such
/// fallback — task dispatch durability is non-negotiable, so a redis outage at startup
/// is a hard failure.
async fn connect_cache_and_broker(redis_url: &str) -> anyhow::Result<(Arc<dyn Cache>, Arc<dyn StreamBroker>)> {
    match RedisCache::connect(redis_url).await {
        Ok(redis_cache) => {
            let broker: Arc<dyn StreamBroker> = Arc::new(common::RedisStreamBroker::new(redis_cache.raw()));
            Ok((Arc::new(redis_cache), broker))
        }
        Err(e) => Err(anyhow::anyhow!("redis unreachable, cannot start dispatcher: {e}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);
    tracing::info!("starting marketplace scraping engine");

    let cfg = AppConfig::from_env();

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let proxy_repo: Arc<dyn ProxyRepository> = Arc::new(SqlxProxyRepository::new((*db.pool).clone()));
    let task_repo: Arc<dyn TaskRepository> = Arc::new(SqlxTaskRepository::new((*db.pool).clone()));
    let found_item_repo: Arc<dyn FoundItemRepository> = Arc::new(SqlxFoundItemRepository::new((*db.pool).clone()));
    let settings_repo: Arc<dyn SettingsRepository> = Arc::new(SqlxSettingsRepository::new((*db.pool).clone()));

    let (cache, broker) = connect_cache_and_broker(&cfg.redis_url).await?;

    let notifier: Arc<dyn NotificationDispatcher> = match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())),
        _ => {
            tracing::warn!("startup: no Telegram credentials configured, notifications are a no-op");
            Arc::new(NoopNotificationDispatcher)
        }
    };
    let alert_sink: Arc<dyn AllQuarantinedSink> = match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())),
        _ => Arc::new(NoopAlertSink),
    };

    let proxy_pool = Arc::new(ProxyPoolManager::new(proxy_repo.clone(), cache.clone(), settings_repo.clone(), alert_sink));
    let retry_cfg = RetryConfig::new(cfg.retry_max_attempts, cfg.proxy_min_delay_secs);

    tokio::spawn(proxypool::run_revival_loop(
        proxy_pool.clone(),
        proxy_repo.clone(),
        cache.clone(),
        "https://steamcommunity.com/market/".to_string(),
        cfg.revival_interval_secs,
        cfg.revival_fast_interval_secs,
    ));

    let marketplace_client: Arc<dyn scraper_pipeline::MarketplaceClient> =
        Arc::new(SteamMarketplaceClient::new(proxy_pool.clone(), retry_cfg.clone()));

    let sticker_client: Arc<dyn stickers::MarketClient> =
        Arc::new(stickers::SteamMarketClient::new(proxy_pool.clone(), retry_cfg.clone()));
    let sticker_resolver_cfg = stickers::StickerResolverConfig {
        appid: cfg.sticker_appid,
        currency: "USD".to_string(),
        inter_request_delay: Duration::from_millis(cfg.sticker_inter_request_delay_ms),
    };
    let sticker_resolver = Arc::new(stickers::StickerPriceResolver::new(sticker_client, cache.clone(), sticker_resolver_cfg));

    let pipeline = Arc::new(ScrapePipeline::new(
        marketplace_client,
        sticker_resolver,
        cache.clone(),
        task_repo.clone(),
        found_item_repo.clone(),
        notifier.clone(),
    ));
    let executor = Arc::new(PipelineTaskExecutor::new(task_repo.clone(), pipeline));

    let currency_fetcher = Arc::new(HttpRateFetcher::new(proxy_pool.clone(), retry_cfg.clone()));
    let currency_service = Arc::new(CurrencyService::new(currency_fetcher, cache.clone()));
    tokio::spawn(currency::run_refresh_loop(currency_service, Duration::from_secs(3600)));

    tokio::spawn(dispatcher::run_sweep_loop(
        task_repo.clone(),
        cache.clone(),
        broker.clone(),
        Duration::from_secs(cfg.sweep_interval_secs),
    ));
    tokio::spawn(dispatcher::run_worker_loop(
        uuid::Uuid::new_v4().to_string(),
        cfg.worker_concurrency,
        cache.clone(),
        broker,
        executor,
    ));
    tokio::spawn(dispatcher::run_maintenance_gc(
        task_repo,
        cache,
        Duration::from_secs(cfg.maintenance_gc_interval_secs),
    ));

    tracing::info!("scraping engine started; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    Ok(())
}
