// ============================================================================
// Event Store - pluggable persistence for event history
// ============================================================================
//
// One contract, three backends:
// - RedisEventStore     - expiring keys + timeline list (soft, TTL retention)
// - PostgresEventStore  - append-only JSONB table (hard cap, trimmed per write)
// - InMemoryEventStore  - per-name ring buffer, same hard cap as Postgres
//
// Ordering is identical everywhere: get_events returns the newest records
// first. Retention is not. Redis lets keys expire and may briefly hold more
// than max_events_per_type records; Postgres and memory never do.
//
// ============================================================================

mod event_store;
pub mod memory_store;
pub mod postgres_store;
pub mod redis_store;

pub use event_store::{effective_limit, EventStore, StoredEvent, DEFAULT_MAX_EVENTS_PER_TYPE};
pub use memory_store::InMemoryEventStore;
pub use postgres_store::{PostgresEventStore, PostgresStoreConfig};
pub use redis_store::{RedisEventStore, RedisStoreConfig};
