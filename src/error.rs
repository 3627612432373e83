use std::fmt;

// ============================================================================
// Mediator Errors
// ============================================================================
//
// Nothing in the mediator or its stores is retried. Every failure is handed
// back to the immediate caller, and publish folds handler and storage
// failures into a single DispatchError so callers can still tell them apart.
//
// ============================================================================

/// Errors returned by the [`Mediator`](crate::mediator::Mediator)
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("no handlers for event: {0}")]
    NoHandlers(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("no event store configured")]
    NoStoreConfigured,

    #[error("event store error: {0}")]
    Store(#[from] StoreError),
}

impl MediatorError {
    pub fn is_no_handlers(&self) -> bool {
        matches!(self, MediatorError::NoHandlers(_))
    }

    pub fn is_no_store_configured(&self) -> bool {
        matches!(self, MediatorError::NoStoreConfigured)
    }

    /// The aggregate of handler/store failures, if this came out of a dispatch
    pub fn as_dispatch(&self) -> Option<&DispatchError> {
        match self {
            MediatorError::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Dispatch Aggregate
// ============================================================================

/// Every failure collected during one publish, in the order it happened.
///
/// Handler failures come first (registration order), followed by at most one
/// storage failure.
#[derive(Debug, thiserror::Error)]
#[error("errors in event handlers for '{event_name}': [{}]", render_failures(.failures))]
pub struct DispatchError {
    pub event_name: String,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchError {
    pub fn handler_failures(&self) -> impl Iterator<Item = &DispatchFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f, DispatchFailure::Handler { .. }))
    }

    pub fn store_failure(&self) -> Option<&StoreError> {
        self.failures.iter().find_map(|f| match f {
            DispatchFailure::Store(err) => Some(err),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum DispatchFailure {
    /// A subscribed handler returned an error
    Handler {
        index: usize,
        handler: String,
        error: anyhow::Error,
    },
    /// The attached store failed to persist the event
    Store(StoreError),
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Handler { index, handler, error } => {
                write!(f, "handler #{} ({}): {:#}", index, handler, error)
            }
            DispatchFailure::Store(err) => write!(f, "failed to store event: {}", err),
        }
    }
}

fn render_failures(failures: &[DispatchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Store Errors
// ============================================================================

/// Errors raised by an [`EventStore`](crate::store::EventStore) backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to (de)serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// DDL or connection failure while initializing a backend
    #[error("failed to initialize event store ({step}): {source}")]
    Construction {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl StoreError {
    pub fn is_construction(&self) -> bool {
        matches!(self, StoreError::Construction { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Context(_))
    }
}

// ============================================================================
// Context & Payload Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A handler asked for a payload shape the event does not carry
#[derive(Debug, thiserror::Error)]
#[error("payload does not match {expected}: {source}")]
pub struct PayloadMismatch {
    pub expected: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_lists_every_failure() {
        let err = DispatchError {
            event_name: "sku.created".to_string(),
            failures: vec![
                DispatchFailure::Handler {
                    index: 0,
                    handler: "audit".to_string(),
                    error: anyhow::anyhow!("audit log unavailable"),
                },
                DispatchFailure::Handler {
                    index: 2,
                    handler: "stock".to_string(),
                    error: anyhow::anyhow!("stock service down"),
                },
                DispatchFailure::Store(StoreError::InvalidConfig("bad prefix".to_string())),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("sku.created"));
        assert!(message.contains("audit log unavailable"));
        assert!(message.contains("stock service down"));
        assert!(message.contains("failed to store event"));
        assert_eq!(err.handler_failures().count(), 2);
        assert!(err.store_failure().is_some());
    }

    #[test]
    fn test_handler_error_context_chain_is_rendered() {
        let failure = DispatchFailure::Handler {
            index: 1,
            handler: "projector".to_string(),
            error: anyhow::anyhow!("connection reset").context("update read model"),
        };

        assert_eq!(
            failure.to_string(),
            "handler #1 (projector): update read model: connection reset"
        );
    }

    #[test]
    fn test_no_handlers_message_names_the_event() {
        let err = MediatorError::NoHandlers("sku.unregistered".to_string());
        assert!(err.is_no_handlers());
        assert_eq!(err.to_string(), "no handlers for event: sku.unregistered");
    }

    #[test]
    fn test_context_error_is_a_store_cancellation() {
        let err: StoreError = ContextError::DeadlineExceeded.into();
        assert!(err.is_cancellation());
        assert_eq!(err.to_string(), "deadline exceeded");
    }
}
