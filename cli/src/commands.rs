use std::collections::HashMap;
use std::time::Duration;

use store::{FoundItemRepository, ProxyRepository, TaskRepository};

use proxypool::normalize_proxy_url;

pub async fn tasks_list(repo: &dyn TaskRepository) -> anyhow::Result<()> {
    let tasks = repo.list_all().await?;
    if tasks.is_empty() {
        println!("no monitoring tasks");
        return Ok(());
    }
    for t in tasks {
        println!(
            "#{id} {name:<24} hash={hash} app_id={app} active={active} interval={interval}s next_check_ms={next} checks={checks} found={found}",
            id = t.id,
            name = t.name,
            hash = t.market_hash_name,
            app = t.app_id,
            active = t.active,
            interval = t.check_interval_secs,
            next = t.next_check_ms,
            checks = t.total_checks,
            found = t.items_found,
        );
    }
    Ok(())
}

pub async fn tasks_delete(repo: &dyn TaskRepository, id: i64) -> anyhow::Result<()> {
    if repo.fetch_by_id(id).await?.is_none() {
        anyhow::bail!("task {id} not found");
    }
    repo.delete(id).await?;
    println!("deleted task {id}");
    Ok(())
}

pub async fn tasks_reset_next_check(repo: &dyn TaskRepository, id: i64) -> anyhow::Result<()> {
    if repo.fetch_by_id(id).await?.is_none() {
        anyhow::bail!("task {id} not found");
    }
    repo.set_next_check(id, common::time::now_ms()).await?;
    println!("task {id} will be dispatched on the next sweep");
    Ok(())
}

pub async fn proxies_list(repo: &dyn ProxyRepository) -> anyhow::Result<()> {
    let proxies = repo.list_all().await?;
    if proxies.is_empty() {
        println!("no proxies registered");
        return Ok(());
    }
    let now = common::time::now_ms();
    for p in proxies {
        let status = if p.is_quarantined(now) { "quarantined" } else if p.active { "active" } else { "inactive" };
        println!(
            "#{id} {url:<40} status={status} success={success} failure={failure} rate_limit_streak={streak}",
            id = p.id,
            url = p.url,
            status = status,
            success = p.success_count,
            failure = p.failure_count,
            streak = p.consecutive_rate_limit_count,
        );
    }
    Ok(())
}

/// Keeps the lowest-id proxy for every normalized URL and deletes the rest, mirroring the
/// duplicate collapsing `add_proxy` already does for newly inserted proxies but applied
/// retroactively across the whole table.
pub async fn proxies_dedupe(repo: &dyn ProxyRepository) -> anyhow::Result<()> {
    let proxies = repo.list_all().await?;
    let mut seen: HashMap<String, i64> = HashMap::new();
    let mut removed = 0u32;

    for p in proxies {
        let canonical = normalize_proxy_url(&p.url);
        match seen.get(&canonical) {
            Some(_) => {
                repo.delete(p.id).await?;
                removed += 1;
            }
            None => {
                seen.insert(canonical, p.id);
            }
        }
    }

    println!("removed {removed} duplicate proxies, {} remain", seen.len());
    Ok(())
}

/// Probes every active proxy against a cheap upstream endpoint and records the outcome.
/// Not idempotent: every call mutates each proxy's success/failure counters.
pub async fn proxies_check_all(repo: &dyn ProxyRepository) -> anyhow::Result<()> {
    const PROBE_URL: &str = "https://steamcommunity.com/market/";
    const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

    let proxies = repo.list_active().await?;
    if proxies.is_empty() {
        println!("no active proxies to check");
        return Ok(());
    }

    let mut ok_count = 0u32;
    let mut fail_count = 0u32;

    for p in proxies {
        let working = probe(&p.url, PROBE_URL, PROBE_TIMEOUT).await;
        if working {
            repo.record_success(p.id, common::time::now_ms()).await?;
            ok_count += 1;
        } else {
            repo.record_failure(p.id, "cli check-all: probe failed").await?;
            fail_count += 1;
        }
        println!("#{} {} -> {}", p.id, p.url, if working { "ok" } else { "failed" });
    }

    println!("checked {} proxies: {ok_count} ok, {fail_count} failed", ok_count + fail_count);
    Ok(())
}

async fn probe(proxy_url: &str, target_url: &str, timeout: Duration) -> bool {
    let Ok(proxy) = reqwest::Proxy::all(proxy_url) else {
        return false;
    };
    let Ok(client) = reqwest::Client::builder().proxy(proxy).timeout(timeout).build() else {
        return false;
    };
    client.get(target_url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
}

pub async fn found_items_purge(repo: &dyn FoundItemRepository) -> anyhow::Result<()> {
    let purged = repo.purge_all().await?;
    println!("purged {purged} found items");
    Ok(())
}
