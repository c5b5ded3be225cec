//! Idempotent broker topology declaration.
//!
//! Every service declares the full topology it depends on at startup:
//! re-declaring an entity with identical parameters is a no-op on the broker,
//! so services can start in any order. A parameter mismatch (a queue already
//! existing as non-durable, say) is a deployment error; it surfaces as
//! [`EventBusError::Topology`] and is never retried.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use streamia_core::event_bus::EventBusError;
use streamia_core::topology::{ExchangeSpec, QueueSpec};

/// Declare the topic exchange.
///
/// # Errors
///
/// Returns [`EventBusError::Topology`] if the exchange exists with different
/// parameters.
pub async fn declare_exchange(
    channel: &Channel,
    exchange: &ExchangeSpec,
) -> Result<(), EventBusError> {
    channel
        .exchange_declare(
            &exchange.name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: exchange.durable,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| EventBusError::Topology {
            name: exchange.name.clone(),
            reason: e.to_string(),
        })?;

    tracing::debug!(exchange = %exchange.name, durable = exchange.durable, "Exchange declared");
    Ok(())
}

/// Declare a durable queue and bind it to each of its routing keys.
///
/// A configured dead-letter exchange becomes the queue's
/// `x-dead-letter-exchange` argument; rejected, non-requeued messages route
/// there instead of being dropped.
///
/// # Errors
///
/// Returns [`EventBusError::Topology`] if the queue exists with different
/// parameters or a binding is refused.
pub async fn declare_queue(
    channel: &Channel,
    exchange: &ExchangeSpec,
    queue: &QueueSpec,
) -> Result<(), EventBusError> {
    let mut arguments = FieldTable::default();
    if let Some(dlx) = &queue.dead_letter_exchange {
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dlx.as_str().into()),
        );
    }

    channel
        .queue_declare(
            &queue.name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            arguments,
        )
        .await
        .map_err(|e| EventBusError::Topology {
            name: queue.name.clone(),
            reason: e.to_string(),
        })?;

    for routing_key in &queue.bindings {
        channel
            .queue_bind(
                &queue.name,
                &exchange.name,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| EventBusError::Topology {
                name: queue.name.clone(),
                reason: format!("binding '{routing_key}' refused: {e}"),
            })?;
    }

    tracing::debug!(
        queue = %queue.name,
        bindings = ?queue.bindings,
        dead_letter_exchange = ?queue.dead_letter_exchange,
        "Queue declared and bound"
    );
    Ok(())
}

/// Declare the exchange and every queue in one pass, in order.
///
/// Used at startup and by the connection supervisor after a reconnect, since
/// a broker restart may have lost non-durable state.
///
/// # Errors
///
/// Returns the first [`EventBusError::Topology`] encountered.
pub async fn declare_all(
    channel: &Channel,
    exchange: &ExchangeSpec,
    queues: &[QueueSpec],
) -> Result<(), EventBusError> {
    declare_exchange(channel, exchange).await?;
    for queue in queues {
        declare_queue(channel, exchange, queue).await?;
    }
    Ok(())
}
