//! In-process event bus
//!
//! Handlers subscribe by event name. `publish` runs every handler subscribed
//! to the event's name concurrently and resolves once all of them have
//! finished. A failing or panicking handler never stops its siblings: each
//! failure is logged on its own and returned in the `PublishReport`.
//!
//! The subscription table sits behind a synchronous lock that is only held
//! long enough to clone the handler list, never across an `.await`.

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use core_kernel::EventId;

use crate::error::HandlerError;
use crate::event::DomainEvent;

/// A subscriber to domain events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Name used in logs and in `EventBus::subscriptions`
    fn name(&self) -> &str;

    /// Processes one event
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// One handler failure during a publish
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: HandlerError,
}

/// Outcome of dispatching one event
#[derive(Debug)]
pub struct PublishReport {
    pub event_id: EventId,
    pub event_name: &'static str,
    /// Number of handlers that were invoked
    pub handled: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    /// True if every invoked handler succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.handled - self.failures.len()
    }
}

/// A registered (event name, handler) pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subscription {
    pub event_name: String,
    pub handler: String,
}

type HandlerTable = HashMap<String, Vec<Arc<dyn EventHandler>>>;

/// Publish/subscribe dispatcher for domain events
///
/// Cloning the bus is cheap and every clone shares the same subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HandlerTable>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an event name
    ///
    /// Returns false if this exact handler instance is already subscribed to
    /// the name, in which case nothing changes.
    pub fn subscribe(&self, event_name: impl Into<String>, handler: Arc<dyn EventHandler>) -> bool {
        let event_name = event_name.into();
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let entry = table.entry(event_name.clone()).or_default();

        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            debug!(event_name = %event_name, handler = handler.name(), "handler already subscribed");
            return false;
        }

        debug!(event_name = %event_name, handler = handler.name(), "handler subscribed");
        entry.push(handler);
        true
    }

    /// Removes a handler from an event name; no-op if it was not subscribed
    pub fn unsubscribe(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = table.get_mut(event_name) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = entry.len() != before;

        if entry.is_empty() {
            table.remove(event_name);
        }
        removed
    }

    /// Lists every current subscription, sorted by event name then handler name
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut subs: Vec<Subscription> = table
            .iter()
            .flat_map(|(event_name, handlers)| {
                handlers.iter().map(move |h| Subscription {
                    event_name: event_name.clone(),
                    handler: h.name().to_string(),
                })
            })
            .collect();
        subs.sort();
        subs
    }

    /// Number of handlers subscribed to an event name
    pub fn handler_count(&self, event_name: &str) -> usize {
        let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        table.get(event_name).map_or(0, Vec::len)
    }

    fn snapshot(&self, event_name: &str) -> Vec<Arc<dyn EventHandler>> {
        let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        table.get(event_name).cloned().unwrap_or_default()
    }

    /// Dispatches an event to every subscribed handler and waits for all of them
    pub async fn publish(&self, event: &DomainEvent) -> PublishReport {
        let handlers = self.snapshot(event.event_name());

        if handlers.is_empty() {
            debug!(
                event_id = %event.event_id(),
                event_name = event.event_name(),
                "no handlers subscribed"
            );
        }

        let runs = handlers.iter().map(|handler| async move {
            let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            let result = match outcome {
                Ok(result) => result,
                Err(panic_info) => Err(HandlerError::Panicked(extract_panic_message(&panic_info))),
            };
            (handler.name().to_string(), result)
        });

        let results = join_all(runs).await;
        let handled = results.len();

        let failures: Vec<HandlerFailure> = results
            .into_iter()
            .filter_map(|(handler, result)| match result {
                Ok(()) => None,
                Err(error) => {
                    error!(
                        event_id = %event.event_id(),
                        event_name = event.event_name(),
                        tenant_id = %event.tenant_id(),
                        handler = %handler,
                        error = %error,
                        "event handler failed"
                    );
                    Some(HandlerFailure { handler, error })
                }
            })
            .collect();

        PublishReport {
            event_id: event.event_id(),
            event_name: event.event_name(),
            handled,
            failures,
        }
    }

    /// Dispatches on the runtime without making the caller wait
    ///
    /// The returned handle may be dropped; dispatch still runs to completion.
    pub fn publish_detached(&self, event: DomainEvent) -> JoinHandle<PublishReport> {
        let bus = self.clone();
        tokio::spawn(async move { bus.publish(&event).await })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions().len())
            .finish()
    }
}

/// Best-effort text of a caught panic payload
pub fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
