use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::event_store::{effective_limit, EventStore, StoredEvent, DEFAULT_MAX_EVENTS_PER_TYPE};
use crate::error::StoreError;
use crate::mediator::{Context, Event};

// ============================================================================
// In-Memory Event Store
// ============================================================================
//
// Process-local history, mostly for tests and demos. Retention is a hard cap
// per name, the same policy the Postgres backend enforces by trimming.
//
// ============================================================================

pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, VecDeque<StoredEvent>>>,
    max_events_per_type: i64,
}

impl InMemoryEventStore {
    pub fn new(max_events_per_type: i64) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            max_events_per_type,
        }
    }

    /// Number of records currently held for `name`
    pub async fn len(&self, name: &str) -> usize {
        self.events.read().await.get(name).map_or(0, VecDeque::len)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS_PER_TYPE)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store_event(&self, ctx: &Context, event: &Event) -> Result<(), StoreError> {
        let mut events = ctx.run(self.events.write()).await?;
        let history = events.entry(event.name.clone()).or_default();

        // Newest at the front
        history.push_front(StoredEvent::from_event(event, Utc::now()));
        if self.max_events_per_type > 0 {
            history.truncate(self.max_events_per_type as usize);
        }

        Ok(())
    }

    async fn get_events(
        &self,
        ctx: &Context,
        name: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = effective_limit(limit, self.max_events_per_type) as usize;
        let events = ctx.run(self.events.read()).await?;

        Ok(events
            .get(name)
            .map(|history| history.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_events(&self, ctx: &Context, name: &str) -> Result<(), StoreError> {
        ctx.run(self.events.write()).await?.remove(name);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
