//! Application payloads.
//!
//! A payload is a type discriminator plus a field set. The field set sits
//! behind a per-payload lock so a payload attached to a shared envelope can be
//! copied while another task is reading or updating it.
//!
//! Lock order: when both are held, the owning envelope's lock is taken
//! before the payload's. New payload types must keep that order.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application data unit carried by an envelope.
#[derive(Serialize, Deserialize)]
#[serde(from = "PayloadSnapshot", into = "PayloadSnapshot")]
pub struct Payload {
    type_name: String,
    fields: Mutex<Map<String, Value>>,
}

/// Serializable, lock-free view of a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    /// Routing discriminator
    #[serde(rename = "type")]
    pub type_name: String,
    /// Field values
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl Payload {
    /// Create an empty payload of the given logical type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Mutex::new(Map::new()),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
        self
    }

    /// Logical type discriminator used for routing.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Check the discriminator.
    pub fn is(&self, type_name: &str) -> bool {
        self.type_name == type_name
    }

    /// Copy of a single field value.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.lock_fields().get(name).cloned()
    }

    /// Set a field, returning the previous value.
    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock_fields().insert(name.into(), value.into())
    }

    /// Remove a field.
    pub fn remove_field(&self, name: &str) -> Option<Value> {
        self.lock_fields().remove(name)
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.lock_fields().len()
    }

    /// Copy the payload under its lock.
    ///
    /// The copy shares nothing with `self`; later mutation of either side is
    /// invisible to the other.
    pub fn shallow_clone(&self) -> Payload {
        let fields = self.lock_fields().clone();
        Payload {
            type_name: self.type_name.clone(),
            fields: Mutex::new(fields),
        }
    }

    /// Lock-free view for serialization and comparison.
    pub fn snapshot(&self) -> PayloadSnapshot {
        PayloadSnapshot {
            type_name: self.type_name.clone(),
            fields: self.lock_fields().clone(),
        }
    }

    fn lock_fields(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for Payload {
    fn clone(&self) -> Self {
        self.shallow_clone()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.snapshot() == other.snapshot()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name)
            .field("fields", &*self.lock_fields())
            .finish()
    }
}

impl From<PayloadSnapshot> for Payload {
    fn from(snapshot: PayloadSnapshot) -> Self {
        Self {
            type_name: snapshot.type_name,
            fields: Mutex::new(snapshot.fields),
        }
    }
}

impl From<Payload> for PayloadSnapshot {
    fn from(payload: Payload) -> Self {
        PayloadSnapshot {
            type_name: payload.type_name,
            fields: payload
                .fields
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}
