//! Exercises the sqlx-backed repositories against a real (in-memory) database, covering
//! the testable properties that only show up once SQL is actually involved: §8 invariants
//! 2/3, Scenario B (duplicate suppression) and Scenario D (counter contention).

use std::sync::Arc;

use sqlx::any::AnyPoolOptions;
use store::{
    FilterSpec, FoundItem, FoundItemRepository, MonitoringTask, ParsedListing, SqlxFoundItemRepository,
    SqlxTaskRepository, TaskRepository,
};

async fn test_pool() -> sqlx::AnyPool {
    sqlx::any::install_default_drivers();
    // A single-connection pool keeps every query against the same in-memory sqlite
    // database; a multi-connection pool would hand out a fresh, empty `:memory:` db per
    // connection.
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    store::schema::migrate(&pool).await.expect("migrate schema");
    pool
}

fn sample_task(id: i64) -> MonitoringTask {
    MonitoringTask {
        id,
        name: "watch".into(),
        market_hash_name: "AK-47 | Redline (Field-Tested)".into(),
        app_id: 730,
        currency_code: "USD".into(),
        filter: FilterSpec { max_price_cents: Some(1000), ..Default::default() },
        active: true,
        check_interval_secs: 60,
        last_check_ms: None,
        next_check_ms: 0,
        total_checks: 0,
        items_found: 0,
    }
}

fn sample_found_item(task_id: i64, listing_id: &str) -> FoundItem {
    FoundItem {
        id: 0,
        task_id,
        listing_id: listing_id.to_string(),
        hash_name: "AK-47 | Redline (Field-Tested)".into(),
        price_cents: 742,
        item_data: ParsedListing {
            listing_id: listing_id.to_string(),
            price_cents: 742,
            float_value: None,
            pattern: None,
            stickers: vec![],
            inspect_link: None,
            total_stickers_price_cents: 0,
        },
        inspect_link: None,
        notification_status: "pending".into(),
        discovered_at_ms: 0,
    }
}

#[tokio::test]
async fn scenario_b_duplicate_suppression() {
    let pool = test_pool().await;
    let repo = SqlxFoundItemRepository::new(pool);

    let item = sample_found_item(1, "723456");
    assert!(repo.insert_if_new(&item).await.unwrap(), "first insert should be new");
    assert!(!repo.insert_if_new(&item).await.unwrap(), "re-scrape of the same listing must not re-emit");

    let rows = repo.list_for_task(1, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn invariant_3_task_listing_pair_unique_even_across_racing_inserts() {
    let pool = test_pool().await;
    let repo = Arc::new(SqlxFoundItemRepository::new(pool));

    let a = repo.clone();
    let b = repo.clone();
    let (r1, r2) = tokio::join!(
        a.insert_if_new(&sample_found_item(1, "999")),
        b.insert_if_new(&sample_found_item(1, "999")),
    );
    let inserted = [r1.unwrap(), r2.unwrap()];
    assert_eq!(inserted.iter().filter(|x| **x).count(), 1, "exactly one of the two concurrent inserts wins");

    let rows = repo.list_for_task(1, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn scenario_d_counter_contention_advances_by_exactly_two() {
    let pool = test_pool().await;
    let task_repo = Arc::new(SqlxTaskRepository::new(pool));
    let task = task_repo.insert(&sample_task(1)).await.unwrap();
    assert_eq!(task.total_checks, 0);

    let r1 = task_repo.clone();
    let r2 = task_repo.clone();
    let (res1, res2) = tokio::join!(
        r1.record_check(1, 1_000, 61_000, 0),
        r2.record_check(1, 1_001, 61_001, 1),
    );
    res1.unwrap();
    res2.unwrap();

    let reloaded = task_repo.fetch_by_id(1).await.unwrap().unwrap();
    assert_eq!(reloaded.total_checks, 2, "invariant 2: total_checks is never lost under double-delivery");
    assert_eq!(reloaded.items_found, 1);
}

#[tokio::test]
async fn next_check_reflects_the_value_the_caller_supplied() {
    let pool = test_pool().await;
    let task_repo = SqlxTaskRepository::new(pool);
    task_repo.insert(&sample_task(1)).await.unwrap();

    task_repo.record_check(1, 1_000, 61_000, 0).await.unwrap();
    let after_first = task_repo.fetch_by_id(1).await.unwrap().unwrap();
    assert_eq!(after_first.next_check_ms, 61_000);

    task_repo.record_check(1, 61_000, 121_000, 0).await.unwrap();
    let after_second = task_repo.fetch_by_id(1).await.unwrap().unwrap();
    assert_eq!(after_second.next_check_ms, 121_000);
    assert!(after_second.next_check_ms > after_first.next_check_ms);
}
