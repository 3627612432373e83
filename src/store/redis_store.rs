use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::event_store::{effective_limit, EventStore, StoredEvent, DEFAULT_MAX_EVENTS_PER_TYPE};
use crate::error::StoreError;
use crate::mediator::{Context, Event};

pub const DEFAULT_REDIS_PREFIX: &str = "mediator:events";
pub const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Redis Event Store
// ============================================================================
//
// Key layout (durable contract):
//   {prefix}:{event_name}:{timestamp_ns}  - serialized StoredEvent, with TTL
//   {prefix}:{event_name}:timeline        - list of the keys above, append order
//
// Storing is two round trips (SET, then a MULTI/EXEC of RPUSH + PEXPIRE +
// LTRIM) and is not atomic as a whole. A crash in between leaves a key
// missing from the timeline, and expiry leaves timeline entries pointing at
// nothing. Reads skip missing keys instead of failing.
//
// The timeline keeps at most max_events_per_type entries. Keys trimmed off
// it are deleted in a third round trip, so history stays bounded even with
// a zero TTL.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RedisStoreConfig {
    /// Namespace for every key this store writes
    pub prefix: String,
    /// Lifetime of each stored event; zero disables expiry
    pub event_ttl: Duration,
    /// Timeline cap and default read limit; `<= 0` leaves retention to the TTL
    pub max_events_per_type: i64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_REDIS_PREFIX.to_string(),
            event_ttl: DEFAULT_EVENT_TTL,
            max_events_per_type: DEFAULT_MAX_EVENTS_PER_TYPE,
        }
    }
}

pub fn event_key(prefix: &str, name: &str, timestamp_ns: i64) -> String {
    format!("{}:{}:{}", prefix, name, timestamp_ns)
}

pub fn timeline_key(prefix: &str, name: &str) -> String {
    format!("{}:{}:timeline", prefix, name)
}

/// Timeline update for one stored key, sent as a single MULTI/EXEC.
///
/// Appends `key`, pushes the timeline's expiry forward, and with a positive
/// cap returns the entries past the newest `max_events_per_type` before
/// trimming them away. The reply is one list (the overflow) when capped and
/// empty otherwise.
fn index_pipeline(
    timeline: &str,
    key: &str,
    ttl_millis: Option<u64>,
    max_events_per_type: i64,
) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.rpush(timeline, key).ignore();
    if let Some(ttl) = ttl_millis {
        pipe.pexpire(timeline, ttl.min(i64::MAX as u64) as i64).ignore();
    }
    if max_events_per_type > 0 {
        let keep = max_events_per_type.min(isize::MAX as i64) as isize;
        pipe.lrange(timeline, 0, -keep - 1);
        pipe.ltrim(timeline, -keep, -1).ignore();
    }
    pipe
}

/// Pair timeline keys (oldest first) with their GET replies and decode the
/// ones still present, newest first. Missing keys are skipped.
fn collect_newest_first(
    keys: &[String],
    values: Vec<Option<String>>,
) -> Result<Vec<StoredEvent>, StoreError> {
    let mut events = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(values).rev() {
        match value {
            Some(raw) => events.push(serde_json::from_str::<StoredEvent>(&raw)?),
            None => {
                tracing::debug!(key = %key, "Skipping expired timeline entry");
            }
        }
    }
    Ok(events)
}

/// Wall-clock source that never hands out the same nanosecond twice.
///
/// When the clock would repeat or go backwards, the previous value plus one
/// nanosecond is used instead, so two events never share a key.
#[derive(Debug, Default)]
struct MonotonicClock {
    last_ns: AtomicI64,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let now_ns = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);

        let mut previous = self.last_ns.load(Ordering::Relaxed);
        loop {
            let candidate = now_ns.max(previous.saturating_add(1));
            match self.last_ns.compare_exchange_weak(
                previous,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_nanos(candidate),
                Err(actual) => previous = actual,
            }
        }
    }
}

pub struct RedisEventStore {
    conn: MultiplexedConnection,
    config: RedisStoreConfig,
    clock: MonotonicClock,
}

impl RedisEventStore {
    pub fn new(conn: MultiplexedConnection, mut config: RedisStoreConfig) -> Self {
        if config.prefix.is_empty() {
            config.prefix = DEFAULT_REDIS_PREFIX.to_string();
        }

        tracing::info!(
            prefix = %config.prefix,
            event_ttl_secs = config.event_ttl.as_secs(),
            "Redis event store ready"
        );

        Self {
            conn,
            config,
            clock: MonotonicClock::default(),
        }
    }

    /// Open a client for `url` and build a store on a multiplexed connection
    pub async fn connect(url: &str, config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn, config))
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn ttl_millis(&self) -> Option<u64> {
        let millis = self.config.event_ttl.as_millis();
        (millis > 0).then(|| millis.min(u64::MAX as u128) as u64)
    }
}

#[async_trait]
impl EventStore for RedisEventStore {
    async fn store_event(&self, ctx: &Context, event: &Event) -> Result<(), StoreError> {
        let timestamp = self.clock.now();
        let record = StoredEvent::from_event(event, timestamp);
        let data = serde_json::to_string(&record)?;

        let prefix = &self.config.prefix;
        let key = event_key(prefix, &event.name, timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX));
        let timeline = timeline_key(prefix, &event.name);
        let ttl = self.ttl_millis();
        let mut conn = self.conn.clone();

        // Round trip 1: the event itself
        ctx.run(async {
            let reply: redis::RedisResult<()> = match ttl {
                Some(ttl) => conn.pset_ex(&key, &data, ttl).await,
                None => conn.set(&key, &data).await,
            };
            reply
        })
        .await??;

        // Round trip 2: index it and cut the timeline back to the cap
        let pipe = index_pipeline(&timeline, &key, ttl, self.config.max_events_per_type);
        let overflow: Vec<String> = ctx
            .run(async {
                let reply: redis::RedisResult<Vec<Vec<String>>> = pipe.query_async(&mut conn).await;
                reply
            })
            .await??
            .into_iter()
            .flatten()
            .collect();

        // Round trip 3, only past the cap: drop the keys that fell off
        if !overflow.is_empty() {
            ctx.run(async {
                let reply: redis::RedisResult<()> = conn.del(&overflow).await;
                reply
            })
            .await??;

            tracing::debug!(
                event_name = %event.name,
                trimmed = overflow.len(),
                "Trimmed Redis timeline past retention cap"
            );
        }

        tracing::debug!(
            event_name = %event.name,
            key = %key,
            "Stored event in Redis"
        );

        Ok(())
    }

    async fn get_events(
        &self,
        ctx: &Context,
        name: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let limit = effective_limit(limit, self.config.max_events_per_type);
        let timeline = timeline_key(&self.config.prefix, name);
        let mut conn = self.conn.clone();

        // Tail of the list = most recent
        let start = -(limit.min(isize::MAX as i64) as isize);
        let keys: Vec<String> = ctx
            .run(async {
                let reply: redis::RedisResult<Vec<String>> = conn.lrange(&timeline, start, -1).await;
                reply
            })
            .await??;

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(key);
        }
        let values: Vec<Option<String>> = ctx
            .run(async {
                let reply: redis::RedisResult<Vec<Option<String>>> = pipe.query_async(&mut conn).await;
                reply
            })
            .await??;

        collect_newest_first(&keys, values)
    }

    async fn clear_events(&self, ctx: &Context, name: &str) -> Result<(), StoreError> {
        let timeline = timeline_key(&self.config.prefix, name);
        let mut conn = self.conn.clone();

        let keys: Vec<String> = ctx
            .run(async {
                let reply: redis::RedisResult<Vec<String>> = conn.lrange(&timeline, 0, -1).await;
                reply
            })
            .await??;

        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.del(&keys).ignore();
        pipe.del(&timeline).ignore();
        ctx.run(async {
            let reply: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
            reply
        })
        .await??;

        tracing::debug!(
            event_name = %name,
            deleted = keys.len(),
            "Cleared events from Redis"
        );

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
