use sqlx::AnyPool;

/// Creates every table this repo owns. Run once at startup; idempotent via
/// `CREATE TABLE IF NOT EXISTS`, safe to call against a warm database.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS proxies (
  id BIGINT PRIMARY KEY,
  url TEXT NOT NULL,
  active BOOLEAN NOT NULL,
  base_delay_secs BIGINT NOT NULL,
  success_count BIGINT NOT NULL,
  failure_count BIGINT NOT NULL,
  consecutive_rate_limit_count BIGINT NOT NULL,
  last_used_ms BIGINT,
  blocked_since_ms BIGINT,
  blocked_until_ms BIGINT,
  last_error TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_proxies_url ON proxies(url);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS monitoring_tasks (
  id BIGINT PRIMARY KEY,
  name TEXT NOT NULL,
  market_hash_name TEXT NOT NULL,
  app_id BIGINT NOT NULL,
  currency_code TEXT NOT NULL,
  filter_json TEXT NOT NULL,
  active BOOLEAN NOT NULL,
  check_interval_secs BIGINT NOT NULL,
  last_check_ms BIGINT,
  next_check_ms BIGINT NOT NULL,
  total_checks BIGINT NOT NULL,
  items_found BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_tasks_dispatchable ON monitoring_tasks(active, next_check_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS found_items (
  id BIGINT PRIMARY KEY,
  task_id BIGINT NOT NULL,
  listing_id TEXT NOT NULL,
  hash_name TEXT NOT NULL,
  price BIGINT NOT NULL,
  item_data_json TEXT NOT NULL,
  inspect_link TEXT,
  notification_status TEXT NOT NULL,
  discovered_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_found_items_task_listing ON found_items(task_id, listing_id);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS app_settings (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
