// ============================================================================
// Mediator - in-process publish/subscribe hub
// ============================================================================
//
// core/     - Event, Payload, Context, EventHandler
// dispatch  - the Mediator itself and the process-wide default instance
//
// ============================================================================

mod core;
mod dispatch;

pub use self::core::*;
pub use dispatch::{global, Mediator};
