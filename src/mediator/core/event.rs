use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{MediatorError, PayloadMismatch};

// ============================================================================
// Event - the unit the mediator routes
// ============================================================================
//
// The mediator and the stores only ever move the payload around. Handlers
// are the one place a payload is turned back into a concrete type, through
// Payload::decode.
//
// ============================================================================

/// A named message with an opaque payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    /// Topic the event is routed on, e.g. `"sku.created"`
    pub name: String,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Build an event from any serializable domain value
    pub fn from_serializable<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, Payload::from_serializable(payload)?))
    }

    pub fn validate(&self) -> Result<(), MediatorError> {
        validate_name(&self.name)
    }
}

/// Names must be non-empty; anything else is accepted as-is
pub fn validate_name(name: &str) -> Result<(), MediatorError> {
    if name.is_empty() {
        return Err(MediatorError::InvalidEvent(
            "event name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Opaque event payload.
///
/// Serialized transparently, so a stored record carries the payload exactly
/// as the producer shaped it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Payload(serde_json::Value);

impl Payload {
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Downcast into a concrete type. A mismatch is an error, never a panic.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadMismatch> {
        T::deserialize(&self.0).map_err(|source| PayloadMismatch {
            expected: std::any::type_name::<T>(),
            source,
        })
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(serde_json::Value::String(value))
    }
}
