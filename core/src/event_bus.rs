//! Event bus abstraction shared by all transports.
//!
//! Services talk to the bus through the [`EventBus`] trait: publish an
//! [`EventEnvelope`] to the deployment's topic exchange, or subscribe a
//! durable queue and receive a stream of [`Delivery`] values. The transport
//! behind the trait is `streamia-amqp` in production and the in-memory bus
//! from `streamia-testing` in tests.
//!
//! # Acknowledgement
//!
//! AMQP acknowledges per message, so each delivery carries its own [`Acker`].
//! The dispatch loop in `streamia-runtime` decides when to ack or nack based
//! on the queue's configured policy; handlers never touch the acker directly.
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so it can be used as a trait object (`Arc<dyn EventBus>`);
//! saga handlers capture the bus to publish confirmation events.

use crate::envelope::EventEnvelope;
use crate::topology::QueueSpec;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future used throughout the bus seams for dyn compatibility.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// `publish` or `subscribe` was called before `connect` succeeded.
    ///
    /// This is enforced, not silently queued: the call fails fast and
    /// performs no network I/O.
    #[error("Event bus not initialized: connect() has not completed")]
    NotInitialized,

    /// The broker connection could not be established or was lost.
    ///
    /// Fatal at startup (after retry exhaustion); at runtime it degrades the
    /// service to not-ready instead of crashing it.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Exchange or queue declaration mismatched an existing entity.
    ///
    /// Indicates a deployment/config error; not retried automatically.
    #[error("Topology declaration failed for '{name}': {reason}")]
    Topology {
        /// The exchange or queue that failed to declare.
        name: String,
        /// The broker's reason.
        reason: String,
    },

    /// The broker refused or dropped a publish.
    #[error("Publish failed for routing key '{routing_key}': {reason}")]
    Publish {
        /// The routing key of the failed publish.
        routing_key: String,
        /// The reason for failure.
        reason: String,
    },

    /// A queue subscription could not be established.
    #[error("Subscription failed for queue '{queue}': {reason}")]
    Subscribe {
        /// The queue that failed to subscribe.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// A delivered message was not a valid event envelope.
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Network or transport error outside the categories above.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Per-message acknowledgement handle.
///
/// Implemented by each transport: the AMQP bus maps this to
/// `basic.ack`/`basic.nack`, the in-memory bus records the outcome for
/// assertions.
pub trait Acker: Send + Sync {
    /// Acknowledge the message; the broker removes it from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] if the acknowledgement could not
    /// reach the broker; the message may then be redelivered.
    fn ack(&self) -> BoxFuture<'_, Result<(), EventBusError>>;

    /// Reject the message. With `requeue`, the broker returns it to the
    /// queue; without, it is dropped or routed to the queue's dead-letter
    /// exchange if one is declared.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Transport`] if the rejection could not reach
    /// the broker.
    fn nack(&self, requeue: bool) -> BoxFuture<'_, Result<(), EventBusError>>;
}

/// A message delivered from a queue: the decoded envelope plus its
/// acknowledgement handle.
pub struct Delivery {
    /// The decoded event envelope.
    pub envelope: EventEnvelope,
    acker: Arc<dyn Acker>,
}

impl Delivery {
    /// Pair an envelope with the transport's acknowledgement handle.
    #[must_use]
    pub fn new(envelope: EventEnvelope, acker: Arc<dyn Acker>) -> Self {
        Self { envelope, acker }
    }

    /// Acknowledge this message.
    ///
    /// # Errors
    ///
    /// See [`Acker::ack`].
    pub async fn ack(&self) -> Result<(), EventBusError> {
        self.acker.ack().await
    }

    /// Reject this message, optionally requeueing it.
    ///
    /// # Errors
    ///
    /// See [`Acker::nack`].
    pub async fn nack(&self, requeue: bool) -> Result<(), EventBusError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("event_type", &self.envelope.event.event_type())
            .field("correlation_id", &self.envelope.correlation_id)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from a queue subscription.
///
/// `Err` items are transport- or decode-level problems surfaced for
/// observability; the transport has already applied its poison-message
/// policy to them, so consumers log and continue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus transports.
///
/// Every publish targets the deployment's single durable topic exchange and
/// is tagged with exactly one event type (the routing key). Queues bound to
/// that routing key each receive one copy; fan-out is the default, not
/// point-to-point.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one bus instance is shared by every
/// publisher and dispatcher in the process.
pub trait EventBus: Send + Sync {
    /// Publish an envelope to the topic exchange with routing key
    /// [`EventEnvelope::routing_key`] and persistent delivery mode.
    ///
    /// A successful broker handoff is treated as success; no publisher-side
    /// confirmation is awaited, so errors surfaced here are connection-level
    /// only, not delivery guarantees.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::NotInitialized`] if `connect` has not completed
    /// - [`EventBusError::Publish`] if the broker handoff fails
    fn publish(&self, envelope: &EventEnvelope) -> BoxFuture<'_, Result<(), EventBusError>>;

    /// Declare `queue` (durable), bind it to its routing keys on the topic
    /// exchange, apply its prefetch limit, and start consuming.
    ///
    /// Deliveries arrive in broker FIFO order; the stream yields them one at
    /// a time so a dispatcher can process a queue strictly sequentially.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::NotInitialized`] if `connect` has not completed
    /// - [`EventBusError::Topology`] on declaration mismatch
    /// - [`EventBusError::Subscribe`] if consumption cannot start
    fn subscribe(&self, queue: &QueueSpec) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>>;
}
