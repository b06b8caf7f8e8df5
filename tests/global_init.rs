//! The process-wide initializer keeps the stores of its first call.

use std::sync::Arc;

use serde_json::json;
use writeback_cache::{
    global,
    models::{User, USERS},
    store::{MemoryCacheStore, MemoryDatabase},
};

fn database_with(name: &str) -> Arc<MemoryDatabase> {
    let db = Arc::new(MemoryDatabase::new());
    db.insert_row(
        USERS,
        json!({"id": 1, "name": name, "passwd": "", "descp": "", "created": 0, "birthday": 0})
            .as_object()
            .cloned()
            .unwrap(),
    )
    .unwrap();
    db
}

#[tokio::test]
async fn test_init_is_first_call_wins() {
    assert!(global::instance().is_none());

    let first_db = database_with("first");
    let second_db = database_with("second");

    let first = global::init(Arc::new(MemoryCacheStore::new(10)), first_db.clone());
    let second = global::init(Arc::new(MemoryCacheStore::new(10)), second_db.clone());
    assert!(std::ptr::eq(first, second));
    assert!(std::ptr::eq(first, global::instance().unwrap()));

    let user: User = second.get(USERS, 1, 0).await.unwrap();
    assert_eq!(user.name, "first");
    assert_eq!(first_db.query_count(), 1);
    assert_eq!(second_db.query_count(), 0);
}
