//! Per-queue consumption loop with a configurable acknowledgement policy.
//!
//! One [`Dispatcher`] per queue. Deliveries are processed strictly
//! sequentially in broker order; there is no parallel handler execution
//! within a queue, which keeps cascading-delete reasoning simple. Running
//! several dispatchers (one per queue) gives parallelism across services and
//! consumer groups; no ordering holds between queues.
//!
//! # Acknowledgement policy
//!
//! What happens after a handler fails is an explicit per-queue choice:
//!
//! - [`AckPolicy::AckAlways`]: acknowledge regardless of outcome. Favors
//!   forward progress; a transient handler failure does **not** trigger
//!   redelivery and shows up only as eventual-consistency lag.
//! - [`AckPolicy::NackRequeue`]: reject with requeue. Stronger guarantee,
//!   but a deterministic failure becomes a hot loop on the same message.
//! - [`AckPolicy::DeadLetter`]: reject without requeue, relying on the
//!   queue's declared dead-letter exchange to isolate poison messages.
//!
//! Successful handling always acknowledges. An event type with no registered
//! handler is logged and acknowledged so a mis-bound queue cannot wedge.

use crate::handler::SagaRegistry;
use futures::StreamExt;
use std::time::Duration;
use streamia_core::event_bus::{Delivery, DeliveryStream};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default bound on graceful drain at shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with a message whose handler failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Acknowledge every delivery regardless of handler outcome (default,
    /// matching the deployed services).
    #[default]
    AckAlways,
    /// Reject failed deliveries and requeue them for redelivery.
    NackRequeue,
    /// Reject failed deliveries without requeue; the broker routes them to
    /// the queue's dead-letter exchange.
    DeadLetter,
}

/// Errors from dispatcher shutdown.
#[derive(Error, Debug)]
pub enum DispatcherError {
    /// The in-flight handler did not finish within the drain timeout; the
    /// dispatcher task was aborted.
    #[error("Dispatcher drain timed out after {0:?}")]
    DrainTimeout(Duration),

    /// The dispatcher task panicked or was cancelled externally.
    #[error("Dispatcher task failed: {0}")]
    Join(String),
}

/// Consumes one queue and routes each delivery to its saga handler.
pub struct Dispatcher {
    queue: String,
    registry: SagaRegistry,
    policy: AckPolicy,
    drain_timeout: Duration,
}

impl Dispatcher {
    /// A dispatcher for `queue` with the given handlers and policy.
    #[must_use]
    pub fn new(queue: impl Into<String>, registry: SagaRegistry, policy: AckPolicy) -> Self {
        Self {
            queue: queue.into(),
            registry,
            policy,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override the shutdown drain bound.
    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Spawn the consumption loop on the runtime and return its handle.
    #[must_use]
    pub fn spawn(self, stream: DeliveryStream) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drain_timeout = self.drain_timeout;
        let task = tokio::spawn(self.run(stream, shutdown_rx));
        DispatcherHandle {
            shutdown: shutdown_tx,
            task,
            drain_timeout,
        }
    }

    /// The consumption loop: one delivery at a time, in order, until the
    /// stream ends or shutdown is signalled.
    ///
    /// A shutdown signal stops consumption of *new* deliveries; the handler
    /// already in flight always runs to completion before the loop exits.
    pub async fn run(self, mut stream: DeliveryStream, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue = %self.queue,
            handlers = self.registry.len(),
            policy = ?self.policy,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(queue = %self.queue, "Shutdown signalled, draining");
                        break;
                    }
                }
                next = stream.next() => {
                    match next {
                        None => {
                            tracing::info!(queue = %self.queue, "Delivery stream ended");
                            break;
                        }
                        Some(Err(err)) => {
                            // The transport already applied its poison policy.
                            tracing::warn!(queue = %self.queue, error = %err, "Transport error surfaced");
                        }
                        Some(Ok(delivery)) => self.dispatch(delivery).await,
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue, "Dispatcher stopped");
    }

    async fn dispatch(&self, delivery: Delivery) {
        let event_type = delivery.envelope.event.event_type();

        let outcome = match self.registry.get(event_type) {
            Some(handler) => handler.handle(&delivery.envelope).await,
            None => {
                tracing::warn!(
                    queue = %self.queue,
                    event_type,
                    "No saga handler registered for delivered event"
                );
                Ok(())
            }
        };

        let resolution = match outcome {
            Ok(()) => {
                tracing::debug!(
                    queue = %self.queue,
                    event_type,
                    correlation_id = ?delivery.envelope.correlation_id,
                    "Event handled"
                );
                delivery.ack().await
            }
            Err(err) => {
                tracing::error!(
                    queue = %self.queue,
                    event_type,
                    correlation_id = ?delivery.envelope.correlation_id,
                    error = %err,
                    "Saga handler failed"
                );
                match self.policy {
                    AckPolicy::AckAlways => delivery.ack().await,
                    AckPolicy::NackRequeue => delivery.nack(true).await,
                    AckPolicy::DeadLetter => delivery.nack(false).await,
                }
            }
        };

        if let Err(err) = resolution {
            tracing::warn!(
                queue = %self.queue,
                event_type,
                error = %err,
                "Acknowledgement failed; message may be redelivered"
            );
        }
    }
}

/// Handle to a spawned dispatcher.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) signals
/// the dispatcher to stop but skips the drain-timeout bookkeeping; prefer an
/// explicit shutdown on the process exit path.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    drain_timeout: Duration,
}

impl DispatcherHandle {
    /// Signal shutdown and wait for the loop to drain, bounded by the
    /// dispatcher's drain timeout. On timeout the task is aborted so a hung
    /// handler cannot block process exit.
    ///
    /// # Errors
    ///
    /// - [`DispatcherError::DrainTimeout`] if the in-flight handler did not
    ///   finish in time
    /// - [`DispatcherError::Join`] if the dispatcher task panicked
    pub async fn shutdown(self) -> Result<(), DispatcherError> {
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(DispatcherError::Join(join_err.to_string())),
            Err(_) => {
                task.abort();
                Err(DispatcherError::DrainTimeout(self.drain_timeout))
            }
        }
    }

    /// True once the consumption loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
