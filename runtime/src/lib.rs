//! # Streamia Runtime
//!
//! Broker-agnostic execution pieces of the Streamia event backbone: the
//! startup retry helper and the per-queue saga dispatch loop.
//!
//! ## Core Components
//!
//! - **Retry**: bounded exponential backoff for bringing up startup
//!   dependencies (broker, database). Not used for individual messages;
//!   message-level retry is an acknowledgement-policy concern.
//! - **Saga Handler**: the contract each service implements per subscribed
//!   event type, a local idempotent cleanup (or fold) plus an optional
//!   confirmation publish.
//! - **Dispatcher**: consumes one queue sequentially, dispatches each
//!   delivery to the registered handler, and acknowledges or rejects per the
//!   queue's configured policy. One dispatcher per queue; parallelism across
//!   services comes from running dispatchers concurrently, never from
//!   parallel handlers within a queue.
//!
//! ## Example
//!
//! ```ignore
//! use streamia_runtime::{Dispatcher, SagaRegistry, AckPolicy, handler_fn};
//! use streamia_core::topology::QueueSpec;
//!
//! let mut registry = SagaRegistry::new();
//! registry.register("user.deleted", handler_fn(|envelope| async move {
//!     // idempotent local cleanup
//!     Ok(())
//! }));
//!
//! let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
//! let stream = bus.subscribe(&queue).await?;
//! let handle = Dispatcher::new(queue.name, registry, AckPolicy::AckAlways).spawn(stream);
//! // ... on shutdown:
//! handle.shutdown().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Per-queue consumption loop and acknowledgement policy.
pub mod dispatcher;

/// Saga handler contract and registry.
pub mod handler;

/// Retry logic with exponential backoff for startup dependencies.
pub mod retry;

pub use dispatcher::{AckPolicy, Dispatcher, DispatcherError, DispatcherHandle};
pub use handler::{HandlerError, SagaHandler, SagaRegistry, handler_fn};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff, retry_with_predicate};
