//! Runs against a live Postgres; skipped unless POSTGRES_TEST_DSN is set.

use serde_json::json;

use event_mediator::store::postgres_store::quote_identifier;
use event_mediator::{Context, Event, EventStore, PostgresEventStore, PostgresStoreConfig};

async fn test_store(table: &str, max_events_per_type: i64) -> Option<PostgresEventStore> {
    let dsn = match std::env::var("POSTGRES_TEST_DSN") {
        Ok(dsn) => dsn,
        Err(_) => {
            eprintln!("POSTGRES_TEST_DSN not set, skipping");
            return None;
        }
    };

    let config = PostgresStoreConfig {
        prefix: format!("mediator_test_{}", table),
        max_events_per_type,
    };
    let store = PostgresEventStore::connect(&dsn, config).await.unwrap();

    // Start every test from an empty table
    let drop_rows = format!("TRUNCATE {}", quote_identifier(&store.config().prefix));
    sqlx::query(&drop_rows).execute(store.pool()).await.unwrap();

    Some(store)
}

async fn row_count(store: &PostgresEventStore, name: &str) -> i64 {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE event_name = $1",
        quote_identifier(&store.config().prefix)
    );
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(name)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

fn indices(events: &[event_mediator::StoredEvent]) -> Vec<i64> {
    events
        .iter()
        .map(|e| e.payload.as_value()["index"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_newest_first_with_limit() {
    let Some(store) = test_store("order", 100).await else {
        return;
    };
    let ctx = Context::background();

    for i in 0..5 {
        store
            .store_event(&ctx, &Event::new("sku.created", json!({"index": i})))
            .await
            .unwrap();
    }

    let events = store.get_events(&ctx, "sku.created", 3).await.unwrap();
    assert_eq!(indices(&events), vec![4, 3, 2]);
    assert!(events.iter().all(|e| e.name == "sku.created"));

    // limit <= 0 falls back to max_events_per_type
    let all = store.get_events(&ctx, "sku.created", 0).await.unwrap();
    assert_eq!(indices(&all), vec![4, 3, 2, 1, 0]);
}

#[tokio::test]
async fn test_trim_keeps_newest_rows() {
    let Some(store) = test_store("trim", 3).await else {
        return;
    };
    let ctx = Context::background();

    for i in 0..7 {
        store
            .store_event(&ctx, &Event::new("sku.created", json!({"index": i})))
            .await
            .unwrap();
    }
    store
        .store_event(&ctx, &Event::new("product.created", json!({"index": 0})))
        .await
        .unwrap();

    assert_eq!(row_count(&store, "sku.created").await, 3);
    assert_eq!(row_count(&store, "product.created").await, 1);

    let events = store.get_events(&ctx, "sku.created", 10).await.unwrap();
    assert_eq!(indices(&events), vec![6, 5, 4]);
}

#[tokio::test]
async fn test_cap_holds_under_concurrent_writers() {
    let Some(store) = test_store("concurrent", 5).await else {
        return;
    };

    for round in 0..20 {
        let writers: Vec<_> = (0..5)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .store_event(
                            &Context::background(),
                            &Event::new("burst", json!({"round": round, "writer": i})),
                        )
                        .await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let rows = row_count(&store, "burst").await;
        assert_eq!(rows, 5, "round {} left {} rows", round, rows);
    }
}

#[tokio::test]
async fn test_clear_only_touches_one_name() {
    let Some(store) = test_store("clear", 100).await else {
        return;
    };
    let ctx = Context::background();

    store.store_event(&ctx, &Event::new("a", "1")).await.unwrap();
    store.store_event(&ctx, &Event::new("b", "2")).await.unwrap();

    store.clear_events(&ctx, "a").await.unwrap();
    store.clear_events(&ctx, "a").await.unwrap();

    assert!(store.get_events(&ctx, "a", 10).await.unwrap().is_empty());
    assert_eq!(store.get_events(&ctx, "b", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_construction_is_idempotent() {
    let Some(store) = test_store("idempotent", 100).await else {
        return;
    };
    let ctx = Context::background();
    store.store_event(&ctx, &Event::new("a", "kept")).await.unwrap();

    let again = PostgresEventStore::new(store.pool().clone(), store.config().clone())
        .await
        .unwrap();

    let events = again.get_events(&ctx, "a", 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload.as_value(), &json!("kept"));
}
