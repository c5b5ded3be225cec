//! The saga handler contract and the per-service registry.
//!
//! Each service wires one handler per event type it subscribes to. A handler
//! performs a *local* mutation (typically a bulk delete filtered by the
//! identifier in the payload) and optionally publishes a confirmation event
//! when the cleanup affected records. Because the transport is
//! at-least-once, the mutation must be idempotent: delete-by-filter is a
//! no-op the second time by construction, delete-by-id-list is not.
//!
//! Handlers own their failure handling. An error returned here is logged by
//! the dispatcher and resolved according to the queue's acknowledgement
//! policy; it never crashes the dispatch loop. A transient saga failure is
//! invisible to end users; it shows up only as eventual-consistency lag,
//! which is the accepted cost of this architecture.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use streamia_core::envelope::EventEnvelope;
use streamia_core::event_bus::{BoxFuture, EventBusError};
use thiserror::Error;

/// Errors a saga handler can report to the dispatcher.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The local store mutation failed.
    #[error("Local store operation failed: {0}")]
    Store(String),

    /// A follow-up publish (confirmation or `*_failed` event) failed.
    #[error("Follow-up publish failed: {0}")]
    Publish(#[from] EventBusError),

    /// Any other handler-specific failure.
    #[error("{0}")]
    Other(String),
}

/// A compensating action bound to one event type.
///
/// Implementations must be idempotent (see module docs) and must not assume
/// exactly-once delivery.
pub trait SagaHandler: Send + Sync {
    /// React to one delivered envelope.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the local action fails; the dispatcher
    /// logs it and acknowledges or rejects the message per the queue's
    /// policy.
    fn handle(&self, envelope: &EventEnvelope) -> BoxFuture<'_, Result<(), HandlerError>>;
}

/// Adapter turning an async closure into a [`SagaHandler`].
///
/// The closure receives an owned clone of the envelope so its future can be
/// `'static`.
pub struct FnHandler<F>(F);

impl<F, Fut> SagaHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, envelope: &EventEnvelope) -> BoxFuture<'_, Result<(), HandlerError>> {
        Box::pin((self.0)(envelope.clone()))
    }
}

/// Wrap an async closure as a [`SagaHandler`].
///
/// ```
/// use streamia_runtime::handler::{SagaRegistry, handler_fn};
///
/// let mut registry = SagaRegistry::new();
/// registry.register("user.deleted", handler_fn(|envelope| async move {
///     let _ = envelope;
///     Ok(())
/// }));
/// assert!(registry.get("user.deleted").is_some());
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

/// Per-service map from event type to handler.
///
/// One handler per (queue, event type) pair: registering a second handler
/// for the same type replaces the first. Services sharing several event
/// types on one queue must not rely on first-registered-wins.
#[derive(Default)]
pub struct SagaRegistry {
    handlers: HashMap<&'static str, Arc<dyn SagaHandler>>,
}

impl SagaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    pub fn register(&mut self, event_type: &'static str, handler: impl SagaHandler + 'static) {
        if self
            .handlers
            .insert(event_type, Arc::new(handler))
            .is_some()
        {
            tracing::warn!(event_type, "Replacing previously registered saga handler");
        }
    }

    /// Look up the handler for an event type.
    #[must_use]
    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn SagaHandler>> {
        self.handlers.get(event_type)
    }

    /// The event types with a registered handler.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
