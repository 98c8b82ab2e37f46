//! Postgres-backed quota and usage stores.
//!
//! These need `DATABASE_URL` pointing at a disposable server and are ignored
//! by default.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use pagesmith::application::quota::QuotaStore;
use pagesmith::application::usage::{Operation, UsageEvent, UsageSink};
use pagesmith::domain::quota::IdentityClass;
use pagesmith::infra::db::PostgresRepositories;
use sqlx::PgPool;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn quota_tables_and_indexes_exist(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename IN ('quota_records', 'usage_logs')",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch indexes");
    let indexes: HashSet<String> = rows.into_iter().collect();
    assert!(indexes.contains("quota_records_pkey"), "{indexes:?}");
    assert!(indexes.contains("usage_logs_pkey"), "{indexes:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn commit_rolls_the_window_and_saturates(pool: PgPool) {
    let store = PostgresRepositories::new(pool);

    assert_eq!(store.load("user:alice").await.expect("load"), None);
    let first = store.commit("user:alice", 2, day(2)).await.expect("commit");
    assert_eq!(first.used_count, 1);
    store.commit("user:alice", 2, day(2)).await.expect("commit");
    let saturated = store.commit("user:alice", 2, day(2)).await.expect("commit");
    assert_eq!(saturated.used_count, 2);

    let next_day = store.commit("user:alice", 2, day(3)).await.expect("commit");
    assert_eq!(next_day.used_count, 1);
    assert_eq!(next_day.window_date, day(3));

    store.discard("user:alice").await.expect("discard");
    assert_eq!(store.load("user:alice").await.expect("load"), None);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_commits_never_exceed_the_limit(pool: PgPool) {
    let store = Arc::new(PostgresRepositories::new(pool));
    let commits = (0..16).map(|_| {
        let store = Arc::clone(&store);
        async move { store.commit("user:bob", 5, day(2)).await }
    });
    for result in join_all(commits).await {
        result.expect("commit");
    }
    let record = store
        .load("user:bob")
        .await
        .expect("load")
        .expect("record exists");
    assert_eq!(record.used_count, 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn usage_events_are_persisted(pool: PgPool) {
    let store = PostgresRepositories::new(pool.clone());
    store
        .record(&UsageEvent {
            operation: Operation::Merge,
            file_count: 2,
            input_bytes: 2048,
            output_bytes: 1900,
            page_count: 5,
            elapsed_ms: 42,
            identity_class: IdentityClass::Anonymous,
            client_version: Some("pagesmith-cli/0.1.0".to_string()),
        })
        .await
        .expect("record usage");

    let (operation, pages): (String, i32) =
        sqlx::query_as("SELECT operation, page_count FROM usage_logs")
            .fetch_one(&pool)
            .await
            .expect("usage row");
    assert_eq!(operation, "merge");
    assert_eq!(pages, 5);
}
