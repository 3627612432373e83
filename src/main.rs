use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_mediator::config::{Config, StoreBackend};
use event_mediator::metrics::{self, MediatorMetrics};
use event_mediator::{
    Context, Event, EventStore, InMemoryEventStore, Mediator, PostgresEventStore, RedisEventStore,
};

// ============================================================================
// Sample domain - only here to exercise the mediator
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
struct SkuCreated {
    sku: String,
    product_id: String,
    quantity: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ProductCreated {
    product_id: String,
    name: String,
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match config.store {
        StoreBackend::Memory => Arc::new(InMemoryEventStore::new(config.max_events_per_type)),
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().unwrap_or_default();
            Arc::new(RedisEventStore::connect(url, config.redis_store_config()).await?)
        }
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            Arc::new(PostgresEventStore::connect(url, config.postgres_store_config()).await?)
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_mediator=debug")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(store = ?config.store, "🚀 Starting event mediator demo");

    // === 1. Store ===
    let store = build_store(&config).await?;

    // === 2. Metrics ===
    let metrics = Arc::new(MediatorMetrics::new()?);
    if let Some(port) = config.metrics_port {
        // actix-web gets its own runtime on a dedicated thread
        let registry = Arc::new(metrics.registry().clone());
        let info = metrics::ExporterInfo::new(store.backend());
        std::thread::spawn(move || match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async {
                if let Err(e) = metrics::start_metrics_server(registry, info, port).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }),
            Err(e) => tracing::error!("Failed to start metrics runtime: {}", e),
        });
    }

    // === 3. Mediator ===
    let mediator = Arc::new(Mediator::with_metrics(metrics.clone()));
    mediator.set_event_store(Some(store)).await;

    // === 4. Subscribers ===
    mediator
        .subscribe_fn("sku.created", |_ctx, event| async move {
            let sku: SkuCreated = event.payload.decode()?;
            tracing::info!(sku = %sku.sku, quantity = sku.quantity, "📦 Stock level recorded");
            anyhow::Ok(())
        })
        .await?;

    mediator
        .subscribe_fn("sku.created", |_ctx, event| async move {
            let sku: SkuCreated = event.payload.decode()?;
            anyhow::ensure!(sku.quantity >= 0, "negative quantity for {}", sku.sku);
            anyhow::Ok(())
        })
        .await?;

    mediator
        .subscribe_fn("product.created", |_ctx, event| async move {
            let product: ProductCreated = event.payload.decode()?;
            tracing::info!(product_id = %product.product_id, name = %product.name, "🏷️ Product indexed");
            anyhow::Ok(())
        })
        .await?;

    // === 5. Publish ===
    let ctx = Context::background().with_timeout(std::time::Duration::from_secs(5));

    mediator
        .publish(
            &ctx,
            Event::from_serializable(
                "product.created",
                &ProductCreated {
                    product_id: "P-001".to_string(),
                    name: "Espresso Beans".to_string(),
                },
            )?,
        )
        .await?;

    for (sku, quantity) in [("SKU-001", 100), ("SKU-002", 25), ("SKU-003", -5)] {
        let event = Event::from_serializable(
            "sku.created",
            &SkuCreated {
                sku: sku.to_string(),
                product_id: "P-001".to_string(),
                quantity,
            },
        )?;

        if let Err(e) = mediator.publish(&ctx, event).await {
            tracing::warn!(error = %e, "Publish reported failures");
        }
    }

    if let Err(e) = mediator.publish(&ctx, Event::new("sku.unregistered", "nobody listens")).await {
        tracing::warn!(error = %e, no_handlers = e.is_no_handlers(), "Publish rejected");
    }

    // === 6. Read history back ===
    println!("Stored sku.created events (newest first):");
    for record in mediator.get_events(&ctx, "sku.created", 10).await? {
        println!("  {} {} {}", record.timestamp, record.name, record.payload.as_value());
    }

    mediator.clear_events(&ctx, "sku.created").await?;
    mediator.clear_events(&ctx, "product.created").await?;

    tracing::info!("🎉 Demo complete!");
    Ok(())
}
