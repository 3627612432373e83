// ============================================================================
// Mediator Core - events, call context, handlers
// ============================================================================
//
// Plain building blocks shared by the dispatcher and the stores. Nothing in
// here knows about subscriptions or persistence.
//
// ============================================================================

pub mod context;
pub mod event;
pub mod handler;

// Re-export core types for convenience
pub use context::Context;
pub use event::{validate_name, Event, Payload};
pub use handler::{handler_fn, EventHandler, FnHandler};
