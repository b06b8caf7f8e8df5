//! End-to-end write-back against a real SQLite durable store.

use std::sync::Arc;
use std::time::Duration;

use writeback_cache::{
    models::{User, CREATE_USERS_TABLE, USERS},
    store::{CacheStore, DurableStore, MemoryCacheStore, SqliteStore},
    CacheSettings, WriteBackCache,
};

async fn setup() -> (Arc<SqliteStore>, Arc<MemoryCacheStore>, WriteBackCache) {
    let db = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    db.execute(CREATE_USERS_TABLE).await.unwrap();
    db.execute("INSERT INTO users VALUES (1, 'guotie', '1234', 'a coder in china', 23, 2300)")
        .await
        .unwrap();

    let cache = Arc::new(MemoryCacheStore::new(100));
    let wbc = WriteBackCache::with_settings(
        cache.clone(),
        db.clone(),
        CacheSettings {
            default_evict: Duration::from_secs(30),
            default_flush: Duration::from_secs(30),
            failed_flush_capacity: 16,
        },
    );
    (db, cache, wbc)
}

#[tokio::test]
async fn test_read_update_flush_cycle() {
    let (db, cache, wbc) = setup().await;

    let mut user: User = wbc.get(USERS, 1, 0).await.unwrap();
    assert_eq!(user.name, "guotie");
    assert_eq!(cache.set_count(), 1);

    user.name = "tiege".to_string();
    user.descp = "it's me".to_string();
    wbc.set(&user, USERS, 1, 1).await.unwrap();

    // durable copy still old until the flush timer fires
    let row = db.query_by_id(USERS, 1).await.unwrap();
    assert_eq!(row["name"], "guotie");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let row = db.query_by_id(USERS, 1).await.unwrap();
    assert_eq!(row["name"], "tiege");
    assert_eq!(row["descp"], "it's me");
    assert!(wbc.failed_flushes().is_empty());
}

#[tokio::test]
async fn test_eviction_then_reload_sees_flushed_write() {
    let (_db, cache, wbc) = setup().await;

    let mut user: User = wbc.get(USERS, 1, 1).await.unwrap();
    user.birthday = 1999;
    wbc.set(&user, USERS, 1, 60).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.hash_get(USERS, 1).await.unwrap().is_none());

    let reloaded: User = wbc.get(USERS, 1, 0).await.unwrap();
    assert_eq!(reloaded.birthday, 1999);
}

#[tokio::test]
async fn test_bad_statement_is_recorded() {
    let (db, _cache, wbc) = setup().await;
    let user: User = wbc.get(USERS, 1, 0).await.unwrap();

    db.execute("DROP TABLE users").await.unwrap();
    wbc.flush(&user, USERS, 1).await.unwrap();

    let failures = wbc.failed_flushes();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].statement.starts_with("UPDATE users"));
}
