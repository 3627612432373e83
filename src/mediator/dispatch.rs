use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use tokio::sync::RwLock;

use super::core::{handler_fn, validate_name, Context, Event, EventHandler};
use crate::error::{DispatchError, DispatchFailure, MediatorError, StoreError};
use crate::metrics::MediatorMetrics;
use crate::store::{EventStore, StoredEvent};

// ============================================================================
// Mediator - synchronous fan-out with optional persistence
// ============================================================================
//
// Registry and store sit behind one tokio RwLock:
// - subscribe / set_event_store take the write lock
// - publish / get_events / clear_events hold the read lock for the whole
//   call, handler and store awaits included
//
// Concurrent publishes therefore never block each other, but a slow handler
// holds off subscribe and set_event_store until it returns.
//
// ============================================================================

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    store: Option<Arc<dyn EventStore>>,
}

/// In-process publish/subscribe hub.
///
/// Create one with [`Mediator::new`] and share it as `Arc<Mediator>`. For
/// code that cannot be handed an instance there is [`global`], a single
/// registry shared by every caller in the process.
///
/// The lock is fair: once a `subscribe` is waiting, new readers queue behind
/// it. A handler that publishes again on the same mediator can therefore
/// wait on a concurrent `subscribe`, which in turn waits on that handler.
/// Keep nested publishes off mediators that are still being subscribed to.
#[derive(Default)]
pub struct Mediator {
    registry: RwLock<Registry>,
    metrics: Option<Arc<MediatorMetrics>>,
}

static GLOBAL_MEDIATOR: LazyLock<Arc<Mediator>> = LazyLock::new(|| Arc::new(Mediator::new()));

/// Process-wide default mediator, built on first access.
///
/// Every caller in the process sees the same subscribers and the same store;
/// there is no per-request isolation and no teardown. Prefer passing an
/// explicit `Arc<Mediator>` so tests can use their own.
pub fn global() -> Arc<Mediator> {
    GLOBAL_MEDIATOR.clone()
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<MediatorMetrics>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            metrics: Some(metrics),
        }
    }

    /// Append `handler` to the handlers for `name`.
    ///
    /// No de-duplication: subscribing the same handler twice runs it twice.
    /// An empty name is rejected, since `publish` never routes one.
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), MediatorError> {
        let name = name.into();
        validate_name(&name)?;

        let mut registry = self.registry.write().await;

        let handlers = registry.subscribers.entry(name.clone()).or_default();
        handlers.push(handler);

        tracing::debug!(
            event_name = %name,
            handler_count = handlers.len(),
            "Subscribed handler"
        );
        Ok(())
    }

    /// Subscribe an async closure; see [`handler_fn`]
    pub async fn subscribe_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> Result<(), MediatorError>
    where
        F: Fn(Context, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let label = format!("{}#fn", name);
        self.subscribe(name, handler_fn(label, f)).await
    }

    pub async fn subscriber_count(&self, name: &str) -> usize {
        self.registry
            .read()
            .await
            .subscribers
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Attach, replace, or (with `None`) detach the event store.
    /// Returns whatever was attached before.
    pub async fn set_event_store(
        &self,
        store: Option<Arc<dyn EventStore>>,
    ) -> Option<Arc<dyn EventStore>> {
        let mut registry = self.registry.write().await;

        tracing::info!(
            backend = store.as_ref().map_or("none", |s| s.backend()),
            "Event store configured"
        );

        std::mem::replace(&mut registry.store, store)
    }

    pub async fn has_event_store(&self) -> bool {
        self.registry.read().await.store.is_some()
    }

    /// Deliver `event` to every handler subscribed to its name, then persist
    /// it if a store is attached.
    ///
    /// Handlers run one after another in subscription order, and all of them
    /// run even when earlier ones fail. Handler and store failures come back
    /// together as one [`DispatchError`]. A name without subscribers is
    /// always an error ([`MediatorError::NoHandlers`]), never a silent no-op.
    pub async fn publish(&self, ctx: &Context, event: Event) -> Result<(), MediatorError> {
        validate_name(&event.name)?;

        let started = Instant::now();
        let registry = self.registry.read().await;

        let handlers = match registry.subscribers.get(&event.name) {
            Some(handlers) if !handlers.is_empty() => handlers,
            _ => {
                tracing::warn!(event_name = %event.name, "No handlers for event");
                if let Some(metrics) = &self.metrics {
                    metrics.record_no_handlers(&event.name);
                }
                return Err(MediatorError::NoHandlers(event.name));
            }
        };

        let mut failures = Vec::new();

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(error) = handler.handle(ctx, &event).await {
                tracing::warn!(
                    event_name = %event.name,
                    handler = handler.name(),
                    index = index,
                    error = %format!("{:#}", error),
                    "Event handler failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_handler_failure(&event.name);
                }
                failures.push(DispatchFailure::Handler {
                    index,
                    handler: handler.name().to_string(),
                    error,
                });
            }
        }

        if let Some(store) = &registry.store {
            let result = store.store_event(ctx, &event).await;
            self.record_store("store_event", store.as_ref(), &result);

            if let Err(error) = result {
                tracing::warn!(
                    event_name = %event.name,
                    backend = store.backend(),
                    error = %error,
                    "Failed to store event"
                );
                failures.push(DispatchFailure::Store(error));
            }
        }

        drop(registry);

        if let Some(metrics) = &self.metrics {
            metrics.record_publish(&event.name, started.elapsed().as_secs_f64(), failures.is_empty());
        }

        if failures.is_empty() {
            tracing::debug!(event_name = %event.name, "Published event");
            Ok(())
        } else {
            Err(DispatchError {
                event_name: event.name,
                failures,
            }
            .into())
        }
    }

    /// Stored history for `name`, newest first. `limit <= 0` uses the
    /// store's max-per-type.
    pub async fn get_events(
        &self,
        ctx: &Context,
        name: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, MediatorError> {
        let registry = self.registry.read().await;
        let store = registry.store.as_ref().ok_or(MediatorError::NoStoreConfigured)?;

        let result = store.get_events(ctx, name, limit).await;
        self.record_store("get_events", store.as_ref(), &result);
        Ok(result?)
    }

    pub async fn clear_events(&self, ctx: &Context, name: &str) -> Result<(), MediatorError> {
        let registry = self.registry.read().await;
        let store = registry.store.as_ref().ok_or(MediatorError::NoStoreConfigured)?;

        let result = store.clear_events(ctx, name).await;
        self.record_store("clear_events", store.as_ref(), &result);
        Ok(result?)
    }

    fn record_store<T>(&self, operation: &str, store: &dyn EventStore, result: &Result<T, StoreError>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_store_operation(store.backend(), operation, result.is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(log: Arc<Mutex<Vec<String>>>, label: &'static str, fail: bool) -> Arc<dyn EventHandler> {
        handler_fn(label, move |_ctx, _event| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label.to_string());
                if fail {
                    anyhow::bail!("{} failed", label);
                }
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_subscribe_appends_handlers() {
        let mediator = Mediator::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recording(log, "h", false);

        mediator.subscribe("test.event", handler.clone()).await.unwrap();
        assert_eq!(mediator.subscriber_count("test.event").await, 1);

        mediator.subscribe("test.event", handler).await.unwrap();
        assert_eq!(mediator.subscriber_count("test.event").await, 2);
        assert_eq!(mediator.subscriber_count("other.event").await, 0);
    }

    #[tokio::test]
    async fn test_publish_without_handlers_fails() {
        let mediator = Mediator::new();

        let err = mediator
            .publish(&Context::background(), Event::new("test.nohandlers", "test payload"))
            .await
            .unwrap_err();

        assert!(err.is_no_handlers());
        assert!(err.to_string().contains("no handlers for event: test.nohandlers"));
    }

    #[tokio::test]
    async fn test_all_handlers_run_in_order_despite_failures() {
        let mediator = Mediator::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        mediator.subscribe("test.multiple", recording(log.clone(), "first", true)).await.unwrap();
        mediator.subscribe("test.multiple", recording(log.clone(), "second", false)).await.unwrap();
        mediator.subscribe("test.multiple", recording(log.clone(), "third", true)).await.unwrap();

        let err = mediator
            .publish(&Context::background(), Event::new("test.multiple", "test payload"))
            .await
            .unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);

        let dispatch = err.as_dispatch().unwrap();
        assert_eq!(dispatch.len(), 2);
        let message = err.to_string();
        assert!(message.contains("errors in event handlers"));
        assert!(message.contains("first failed"));
        assert!(message.contains("third failed"));
    }

    #[tokio::test]
    async fn test_empty_event_name_is_rejected() {
        let mediator = Mediator::new();
        let err = mediator
            .publish(&Context::background(), Event::new("", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediatorError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_empty_name() {
        let mediator = Mediator::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let err = mediator.subscribe("", recording(log.clone(), "h", false)).await.unwrap_err();
        assert!(matches!(err, MediatorError::InvalidEvent(_)));

        let err = mediator
            .subscribe_fn("", |_ctx, _event| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, MediatorError::InvalidEvent(_)));

        assert_eq!(mediator.subscriber_count("").await, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_requires_a_store() {
        let mediator = Mediator::new();
        let ctx = Context::background();

        assert!(mediator.get_events(&ctx, "x", 10).await.unwrap_err().is_no_store_configured());
        assert!(mediator.clear_events(&ctx, "x").await.unwrap_err().is_no_store_configured());
    }

    #[tokio::test]
    async fn test_metrics_track_publish_outcomes() {
        let metrics = Arc::new(MediatorMetrics::new().unwrap());
        let mediator = Mediator::with_metrics(metrics.clone());
        let ctx = Context::background();

        mediator
            .subscribe_fn("sku.created", |_ctx, _event| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();
        mediator.publish(&ctx, Event::new("sku.created", "x")).await.unwrap();
        let _ = mediator.publish(&ctx, Event::new("sku.unregistered", "x")).await;

        assert_eq!(
            metrics.events_published.with_label_values(&["sku.created", "success"]).get(),
            1
        );
        assert_eq!(metrics.no_handlers.with_label_values(&["sku.unregistered"]).get(), 1);
    }

    #[test]
    fn test_global_is_a_single_instance() {
        let first = global();
        let second = global();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
