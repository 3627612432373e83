//! In-process publish/subscribe mediator with pluggable event history.
//!
//! Producers publish named [`Event`]s; the [`Mediator`] runs every handler
//! subscribed to that name, in subscription order, and optionally persists
//! the event to an attached [`EventStore`] (Redis, Postgres, or memory).
//! All handler and storage failures of one publish come back as a single
//! [`DispatchError`].

pub mod config;
pub mod error;
pub mod mediator;
pub mod metrics;
pub mod store;

pub use error::{ContextError, DispatchError, DispatchFailure, MediatorError, PayloadMismatch, StoreError};
pub use mediator::{global, handler_fn, Context, Event, EventHandler, Mediator, Payload};
pub use store::{
    EventStore, InMemoryEventStore, PostgresEventStore, PostgresStoreConfig, RedisEventStore,
    RedisStoreConfig, StoredEvent,
};
