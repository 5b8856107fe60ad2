//! Operation-kind subscription table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::{Envelope, EnvelopeReceiver, MessageParameters, OperationKind};

/// Callback invoked for each envelope of a subscribed kind.
pub type EnvelopeHandler = Arc<dyn Fn(&Envelope, &MessageParameters) + Send + Sync>;

/// Handlers keyed by operation kind.
///
/// Populated when a session is built and read-mostly afterwards. Handlers
/// run outside the table lock, so a handler may subscribe further handlers.
#[derive(Default)]
pub struct SubscriptionTable {
    handlers: RwLock<HashMap<OperationKind, Vec<EnvelopeHandler>>>,
}

impl SubscriptionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`.
    pub fn subscribe<F>(&self, kind: OperationKind, handler: F)
    where
        F: Fn(&Envelope, &MessageParameters) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of handlers for `kind`.
    pub fn subscriber_count(&self, kind: OperationKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, kind: OperationKind) -> Vec<EnvelopeHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl EnvelopeReceiver for SubscriptionTable {
    fn on_envelope_received(&self, envelope: &Envelope, parameters: &MessageParameters) {
        let kind = envelope.operation_kind();
        let handlers = self.handlers_for(kind);
        if handlers.is_empty() {
            tracing::debug!(?kind, payload = envelope.payload().type_name(), "no subscriber");
            return;
        }
        for handler in handlers {
            handler(envelope, parameters);
        }
    }
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("SubscriptionTable")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::protocol::Payload;

    #[test]
    fn test_routes_by_kind() {
        let table = SubscriptionTable::new();
        let events = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&events);
        table.subscribe(OperationKind::Event, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let params = MessageParameters::default();
        table.on_envelope_received(&Envelope::event(Payload::new("E")), &params);
        table.on_envelope_received(&Envelope::request(Payload::new("R")), &params);

        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert_eq!(table.subscriber_count(OperationKind::Event), 1);
        assert_eq!(table.subscriber_count(OperationKind::Request), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_dispatch() {
        let table = Arc::new(SubscriptionTable::new());
        let inner = Arc::clone(&table);
        table.subscribe(OperationKind::Event, move |_, _| {
            inner.subscribe(OperationKind::Response, |_, _| {});
        });

        table.on_envelope_received(&Envelope::event(Payload::new("E")), &MessageParameters::default());
        assert_eq!(table.subscriber_count(OperationKind::Response), 1);
    }
}
