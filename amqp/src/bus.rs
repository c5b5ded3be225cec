//! AMQP implementation of the [`EventBus`] trait.
//!
//! Publishing targets the deployment's durable topic exchange with the
//! envelope's event type as routing key and persistent delivery mode, so
//! messages survive a broker restart once routed to a durable queue. A
//! successful broker handoff counts as published; publisher confirms are not
//! awaited.
//!
//! Each subscription runs on its own channel so per-queue prefetch limits
//! apply independently, and forwards decoded deliveries through a spawned
//! consumer task. A message that fails to decode is acknowledged (it can
//! never succeed on redelivery) and surfaced to the stream as an `Err` item
//! for observability.

use crate::connection::BrokerConnection;
use crate::topology;
use futures::StreamExt;
use lapin::BasicProperties;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use std::sync::Arc;
use streamia_core::config::BusConfig;
use streamia_core::envelope::EventEnvelope;
use streamia_core::event_bus::{
    Acker, BoxFuture, Delivery, DeliveryStream, EventBus, EventBusError,
};
use streamia_core::topology::{ExchangeSpec, QueueSpec};

/// Buffer between each consumer task and its subscriber stream.
const DELIVERY_BUFFER: usize = 128;

/// Marks the payload as persistent so durable queues keep it across broker
/// restarts.
const PERSISTENT: u8 = 2;

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

impl Acker for AmqpAcker {
    fn ack(&self) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            self.acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| EventBusError::Transport(e.to_string()))
        })
    }

    fn nack(&self, requeue: bool) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            self.acker
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
                .map_err(|e| EventBusError::Transport(e.to_string()))
        })
    }
}

/// AMQP event bus.
///
/// # Example
///
/// ```no_run
/// use streamia_amqp::AmqpEventBus;
/// use streamia_core::config::BusConfig;
/// use streamia_core::envelope::{DomainEvent, EventEnvelope};
/// use streamia_core::event_bus::EventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = AmqpEventBus::connect(BusConfig::from_env("comment-service")).await?;
///
/// bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
///     user_id: "u1".into(),
/// }))
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct AmqpEventBus {
    connection: Arc<BrokerConnection>,
    exchange: ExchangeSpec,
}

impl AmqpEventBus {
    /// Connect to the broker and declare the topic exchange.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::Connection`] if the broker is unreachable after the
    ///   caller's retry budget (this call itself attempts once; wrap it in
    ///   `retry_with_backoff` at startup)
    /// - [`EventBusError::Topology`] if the exchange exists with different
    ///   parameters
    pub async fn connect(config: BusConfig) -> Result<Self, EventBusError> {
        let exchange = ExchangeSpec::topic(config.exchange.clone());
        let connection = Arc::new(BrokerConnection::new(config));

        let channel = connection.connect().await?;
        topology::declare_exchange(&channel, &exchange).await?;

        Ok(Self {
            connection,
            exchange,
        })
    }

    /// Wrap an existing connection; the exchange must already be declared or
    /// be declared by the supervisor.
    #[must_use]
    pub fn with_connection(connection: Arc<BrokerConnection>, exchange: ExchangeSpec) -> Self {
        Self {
            connection,
            exchange,
        }
    }

    /// The underlying connection, for supervisor wiring and health checks.
    #[must_use]
    pub fn connection(&self) -> Arc<BrokerConnection> {
        Arc::clone(&self.connection)
    }

    /// Close the connection gracefully.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }
}

impl EventBus for AmqpEventBus {
    fn publish(&self, envelope: &EventEnvelope) -> BoxFuture<'_, Result<(), EventBusError>> {
        let envelope = envelope.clone();
        Box::pin(async move {
            let routing_key = envelope.routing_key().to_string();
            let channel = self.connection.channel().await?;

            let payload = envelope
                .to_bytes()
                .map_err(|e| EventBusError::Publish {
                    routing_key: routing_key.clone(),
                    reason: e.to_string(),
                })?;

            let properties = BasicProperties::default()
                .with_content_type("application/json".into())
                .with_delivery_mode(PERSISTENT);

            let _confirm = channel
                .basic_publish(
                    &self.exchange.name,
                    &routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await
                .map_err(|e| EventBusError::Publish {
                    routing_key: routing_key.clone(),
                    reason: e.to_string(),
                })?;

            tracing::debug!(
                exchange = %self.exchange.name,
                routing_key = %routing_key,
                correlation_id = ?envelope.correlation_id,
                "Event published"
            );
            Ok(())
        })
    }

    fn subscribe(&self, queue: &QueueSpec) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>> {
        let queue = queue.clone();
        Box::pin(async move {
            let channel = self.connection.create_channel().await?;

            channel
                .basic_qos(queue.prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| EventBusError::Subscribe {
                    queue: queue.name.clone(),
                    reason: e.to_string(),
                })?;

            topology::declare_queue(&channel, &self.exchange, &queue).await?;

            let consumer_tag = format!(
                "{}.{}",
                self.connection.config().service_name,
                queue.name
            );
            let mut consumer = channel
                .basic_consume(
                    &queue.name,
                    &consumer_tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| EventBusError::Subscribe {
                    queue: queue.name.clone(),
                    reason: e.to_string(),
                })?;

            tracing::info!(
                queue = %queue.name,
                bindings = ?queue.bindings,
                prefetch = queue.prefetch,
                "Subscribed"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(DELIVERY_BUFFER);
            let queue_name = queue.name.clone();

            // The consumer task owns the channel; it exits when the broker
            // closes the consumer or the subscriber drops the stream.
            tokio::spawn(async move {
                while let Some(item) = consumer.next().await {
                    match item {
                        Ok(message) => {
                            let acker = message.acker.clone();
                            match EventEnvelope::from_bytes(&message.data) {
                                Ok(envelope) => {
                                    let delivery =
                                        Delivery::new(envelope, Arc::new(AmqpAcker { acker }));
                                    if tx.send(Ok(delivery)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    // Undecodable payloads can never succeed on
                                    // redelivery; ack and surface the error.
                                    tracing::warn!(
                                        queue = %queue_name,
                                        error = %err,
                                        "Discarding undecodable message"
                                    );
                                    if let Err(ack_err) =
                                        acker.ack(BasicAckOptions::default()).await
                                    {
                                        tracing::warn!(
                                            queue = %queue_name,
                                            error = %ack_err,
                                            "Failed to ack undecodable message"
                                        );
                                    }
                                    let err = EventBusError::Deserialization(err.to_string());
                                    if tx.send(Err(err)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            let err = EventBusError::Transport(err.to_string());
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                tracing::debug!(queue = %queue_name, "Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amqp_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AmqpEventBus>();
        assert_sync::<AmqpEventBus>();
    }

    #[tokio::test]
    async fn publish_before_connect_fails_fast() {
        use streamia_core::envelope::DomainEvent;

        let bus = AmqpEventBus::with_connection(
            Arc::new(BrokerConnection::new(BusConfig::new(
                "amqp://localhost:5672",
                "test-service",
            ))),
            ExchangeSpec::default(),
        );
        let envelope = EventEnvelope::new(DomainEvent::UserDeleted {
            user_id: "u1".into(),
        });

        assert!(matches!(
            bus.publish(&envelope).await,
            Err(EventBusError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn subscribe_before_connect_fails_fast() {
        let bus = AmqpEventBus::with_connection(
            Arc::new(BrokerConnection::new(BusConfig::new(
                "amqp://localhost:5672",
                "test-service",
            ))),
            ExchangeSpec::default(),
        );

        assert!(matches!(
            bus.subscribe(&QueueSpec::new("test.queue")).await.err(),
            Some(EventBusError::NotInitialized)
        ));
    }
}
