use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::Context;
use super::event::Event;

// ============================================================================
// Event Handlers
// ============================================================================

/// A subscriber callback, invoked synchronously (in publish order) by the
/// mediator for every event published under the name it subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, event: &Event) -> anyhow::Result<()>;

    /// Label used when this handler shows up in a dispatch error
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter that lets a plain async closure act as an [`EventHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Context, Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, ctx: &Context, event: &Event) -> anyhow::Result<()> {
        (self.f)(ctx.clone(), event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure into a shareable handler.
///
/// ```ignore
/// let audit = handler_fn("audit", |_ctx, event| async move {
///     tracing::info!(event = %event.name, "seen");
///     Ok(())
/// });
/// mediator.subscribe("sku.created", audit).await;
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Context, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
