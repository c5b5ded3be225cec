//! In-memory [`EventBus`] implementation emulating one topic exchange.
//!
//! Semantics mirrored from the real broker:
//!
//! - a publish is routed to every queue with at least one binding matching
//!   the routing key, one copy per queue (fan-out, never per binding)
//! - deliveries within a queue arrive in publish order (FIFO)
//! - no ordering holds between queues
//!
//! Divergences, acceptable for tests: `nack(requeue = true)` records the
//! requeue but does not redeliver, and nothing is durable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use streamia_core::envelope::EventEnvelope;
use streamia_core::event_bus::{
    Acker, BoxFuture, Delivery, DeliveryStream, EventBus, EventBusError,
};
use streamia_core::topology::{QueueSpec, topic_matches};
use tokio::sync::mpsc;

/// Acknowledgement counters for one queue.
#[derive(Debug, Default)]
pub struct QueueCounters {
    acked: AtomicU64,
    nacked: AtomicU64,
    requeued: AtomicU64,
}

struct RecordingAcker {
    counters: Arc<QueueCounters>,
}

impl Acker for RecordingAcker {
    fn ack(&self) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            self.counters.acked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn nack(&self, requeue: bool) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            self.counters.nacked.fetch_add(1, Ordering::SeqCst);
            if requeue {
                self.counters.requeued.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }
}

struct QueueEntry {
    bindings: Vec<String>,
    sender: mpsc::UnboundedSender<Delivery>,
    counters: Arc<QueueCounters>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, QueueEntry>,
    published: Vec<EventEnvelope>,
}

/// In-memory event bus for tests.
///
/// # Example
///
/// ```
/// use streamia_core::envelope::{DomainEvent, EventEnvelope};
/// use streamia_core::event_bus::EventBus;
/// use streamia_core::topology::QueueSpec;
/// use streamia_testing::InMemoryEventBus;
/// use futures::StreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
/// let mut stream = bus.subscribe(&queue).await?;
///
/// bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
///     user_id: "u1".into(),
/// }))
/// .await?;
///
/// let delivery = stream.next().await.transpose()?.ok_or("no delivery")?;
/// assert_eq!(delivery.envelope.routing_key(), "user.deleted");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventBus {
    /// An empty bus with no queues bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Every envelope published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.lock().published.clone()
    }

    /// Published envelopes whose routing key equals `event_type`.
    #[must_use]
    pub fn published_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.lock()
            .published
            .iter()
            .filter(|envelope| envelope.routing_key() == event_type)
            .cloned()
            .collect()
    }

    /// Number of acknowledged deliveries on `queue`.
    #[must_use]
    pub fn acked(&self, queue: &str) -> u64 {
        self.counter(queue, |c| &c.acked)
    }

    /// Number of rejected deliveries on `queue`.
    #[must_use]
    pub fn nacked(&self, queue: &str) -> u64 {
        self.counter(queue, |c| &c.nacked)
    }

    /// Number of rejected deliveries on `queue` that asked for requeue.
    #[must_use]
    pub fn requeued(&self, queue: &str) -> u64 {
        self.counter(queue, |c| &c.requeued)
    }

    fn counter(&self, queue: &str, field: impl Fn(&QueueCounters) -> &AtomicU64) -> u64 {
        self.lock()
            .queues
            .get(queue)
            .map_or(0, |entry| field(&entry.counters).load(Ordering::SeqCst))
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, envelope: &EventEnvelope) -> BoxFuture<'_, Result<(), EventBusError>> {
        let envelope = envelope.clone();
        Box::pin(async move {
            let routing_key = envelope.routing_key();
            let mut inner = self.lock();
            inner.published.push(envelope.clone());

            // One copy per queue with any matching binding, like the broker.
            for (name, entry) in &inner.queues {
                let matched = entry
                    .bindings
                    .iter()
                    .any(|pattern| topic_matches(pattern, routing_key));
                if !matched {
                    continue;
                }

                let delivery = Delivery::new(
                    envelope.clone(),
                    Arc::new(RecordingAcker {
                        counters: Arc::clone(&entry.counters),
                    }),
                );
                if entry.sender.send(delivery).is_err() {
                    tracing::debug!(queue = %name, "Subscriber dropped, delivery discarded");
                }
            }

            Ok(())
        })
    }

    fn subscribe(&self, queue: &QueueSpec) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>> {
        let queue = queue.clone();
        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            let counters = Arc::new(QueueCounters::default());

            self.lock().queues.insert(
                queue.name.clone(),
                QueueEntry {
                    bindings: queue.bindings.clone(),
                    sender,
                    counters,
                },
            );

            let stream = async_stream::stream! {
                while let Some(delivery) = receiver.recv().await {
                    yield Ok(delivery);
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
