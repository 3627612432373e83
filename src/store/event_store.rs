use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::mediator::{Context, Event, Payload};

/// Retention cap (and default read limit) when a config does not set one
pub const DEFAULT_MAX_EVENTS_PER_TYPE: i64 = 1000;

// ============================================================================
// Stored Record
// ============================================================================

/// One persisted event. Created at publish time and never mutated; it goes
/// away only through `clear_events` or the backend's own retention.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub name: String,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl StoredEvent {
    pub fn from_event(event: &Event, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: event.name.clone(),
            payload: event.payload.clone(),
            timestamp,
        }
    }

    pub fn into_event(self) -> Event {
        Event {
            name: self.name,
            payload: self.payload,
        }
    }
}

// ============================================================================
// EventStore Contract
// ============================================================================

/// Append/read/delete contract every persistence backend satisfies.
///
/// The mediator depends on nothing else, so backends are interchangeable.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably record `event`. If this returns `Ok`, the event is stored.
    async fn store_event(&self, ctx: &Context, event: &Event) -> Result<(), StoreError>;

    /// Up to `limit` most recent records for `name`, newest first.
    /// `limit <= 0` falls back to the backend's max-per-type.
    async fn get_events(
        &self,
        ctx: &Context,
        name: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Delete every record for `name`. Clearing an unknown name succeeds.
    async fn clear_events(&self, ctx: &Context, name: &str) -> Result<(), StoreError>;

    /// Short backend label for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Resolve a caller-supplied read limit against the configured cap
pub fn effective_limit(limit: i64, max_events_per_type: i64) -> i64 {
    if limit <= 0 {
        if max_events_per_type > 0 {
            max_events_per_type
        } else {
            DEFAULT_MAX_EVENTS_PER_TYPE
        }
    } else {
        limit
    }
}
