//! Integration tests for [`AmqpEventBus`] against a real RabbitMQ instance.
//!
//! These tests use testcontainers to spin up a real broker and validate:
//! - Publish/consume round-trip with the JSON wire format
//! - Fan-out: one copy per bound queue
//! - FIFO ordering within a queue
//! - Redelivery after `nack(requeue = true)`
//! - Poison-message handling (undecodable payloads are acked and surfaced)
//! - Supervisor recovery across a broker restart
//!
//! # Running These Tests
//!
//! Marked `#[ignore]` by default because they require Docker and take a few
//! seconds each to start RabbitMQ. To run explicitly:
//!
//! ```bash
//! cargo test -p streamia-amqp --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use std::time::Duration;
use streamia_amqp::{AmqpEventBus, ConnectionSupervisor};
use streamia_core::config::BusConfig;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::{Delivery, DeliveryStream, EventBus, EventBusError};
use streamia_core::topology::{ExchangeSpec, QueueSpec};
use streamia_runtime::retry::RetryPolicy;
use testcontainers::core::ContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::rabbitmq::RabbitMq;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

async fn start_broker() -> (ContainerAsync<RabbitMq>, String) {
    let container = RabbitMq::default()
        .start()
        .await
        .expect("Failed to start RabbitMQ container");
    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5672)
        .await
        .expect("Failed to get port");
    (container, format!("amqp://guest:guest@{host}:{port}"))
}

async fn connect(url: &str) -> AmqpEventBus {
    AmqpEventBus::connect(BusConfig::new(url, "integration-test"))
        .await
        .expect("Failed to connect to broker")
}

async fn next_delivery(stream: &mut DeliveryStream) -> Delivery {
    tokio::time::timeout(RECEIVE_TIMEOUT, stream.next())
        .await
        .expect("Timed out waiting for delivery")
        .expect("Stream ended unexpectedly")
        .expect("Delivery failed to decode")
}

fn user_deleted(user_id: &str) -> EventEnvelope {
    EventEnvelope::new(DomainEvent::UserDeleted {
        user_id: user_id.into(),
    })
}

#[tokio::test]
#[ignore]
async fn publish_and_consume_round_trip() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
    let mut stream = bus.subscribe(&queue).await.expect("Failed to subscribe");

    let envelope = user_deleted("u1").with_correlation_id("corr-1");
    bus.publish(&envelope).await.expect("Failed to publish");

    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.envelope.routing_key(), "user.deleted");
    assert_eq!(delivery.envelope.correlation_id.as_deref(), Some("corr-1"));
    match delivery.envelope.event {
        DomainEvent::UserDeleted { ref user_id } => assert_eq!(user_id, "u1"),
        ref other => panic!("unexpected event {other:?}"),
    }
    delivery.ack().await.expect("Failed to ack");

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn fan_out_delivers_one_copy_per_bound_queue() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let mut comments = bus
        .subscribe(&QueueSpec::new("comments.movie.queue").bind("movie.deleted"))
        .await
        .expect("Failed to subscribe comments");
    let mut favorites = bus
        .subscribe(&QueueSpec::new("favorites.movie.queue").bind("movie.deleted"))
        .await
        .expect("Failed to subscribe favorites");

    bus.publish(&EventEnvelope::new(DomainEvent::MovieDeleted {
        movie_id: "m1".into(),
        title: "Heat".into(),
        category: "crime".into(),
    }))
    .await
    .expect("Failed to publish");

    for stream in [&mut comments, &mut favorites] {
        let delivery = next_delivery(stream).await;
        assert_eq!(delivery.envelope.routing_key(), "movie.deleted");
        delivery.ack().await.expect("Failed to ack");
    }

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn deliveries_arrive_in_publish_order() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
    let mut stream = bus.subscribe(&queue).await.expect("Failed to subscribe");

    for id in ["u1", "u2", "u3"] {
        bus.publish(&user_deleted(id)).await.expect("Failed to publish");
    }

    for expected in ["u1", "u2", "u3"] {
        let delivery = next_delivery(&mut stream).await;
        match delivery.envelope.event {
            DomainEvent::UserDeleted { ref user_id } => assert_eq!(user_id, expected),
            ref other => panic!("unexpected event {other:?}"),
        }
        delivery.ack().await.expect("Failed to ack");
    }

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn nack_with_requeue_redelivers() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let queue = QueueSpec::new("ratings.user.queue").bind("user.deleted");
    let mut stream = bus.subscribe(&queue).await.expect("Failed to subscribe");

    bus.publish(&user_deleted("u1")).await.expect("Failed to publish");

    let first = next_delivery(&mut stream).await;
    first.nack(true).await.expect("Failed to nack");

    let second = next_delivery(&mut stream).await;
    match second.envelope.event {
        DomainEvent::UserDeleted { ref user_id } => assert_eq!(user_id, "u1"),
        ref other => panic!("unexpected event {other:?}"),
    }
    second.ack().await.expect("Failed to ack");

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn undecodable_message_is_surfaced_and_does_not_wedge_the_queue() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
    let mut stream = bus.subscribe(&queue).await.expect("Failed to subscribe");

    // Bypass the envelope codec and publish junk on the same routing key.
    let channel = bus
        .connection()
        .channel()
        .await
        .expect("Failed to get channel");
    channel
        .basic_publish(
            "domain.events",
            "user.deleted",
            lapin::options::BasicPublishOptions::default(),
            b"not json",
            lapin::BasicProperties::default(),
        )
        .await
        .expect("Failed to publish junk");

    bus.publish(&user_deleted("u1")).await.expect("Failed to publish");

    // The junk surfaces as a deserialization error...
    let poison = tokio::time::timeout(RECEIVE_TIMEOUT, stream.next())
        .await
        .expect("Timed out waiting for poison item")
        .expect("Stream ended unexpectedly");
    assert!(matches!(poison, Err(EventBusError::Deserialization(_))));

    // ...and the queue keeps flowing.
    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.envelope.routing_key(), "user.deleted");
    delivery.ack().await.expect("Failed to ack");

    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn supervisor_reconnects_and_redeclares_after_a_broker_restart() {
    // An ephemeral host port would be reallocated by the restart, so pin it:
    // the connection URL must stay valid across stop/start.
    let host_port: u16 = 56720;
    let container = RabbitMq::default()
        .with_mapped_port(host_port, ContainerPort::Tcp(5672))
        .start()
        .await
        .expect("Failed to start RabbitMQ container");
    let host = container.get_host().await.expect("Failed to get host");
    let url = format!("amqp://guest:guest@{host}:{host_port}");

    let bus = connect(&url).await;
    let queue = QueueSpec::new("comments.user.queue").bind("user.deleted");
    let supervisor = ConnectionSupervisor::new(
        bus.connection(),
        ExchangeSpec::topic("domain.events"),
    )
    .watch_queue(queue.clone())
    .with_policy(
        RetryPolicy::builder()
            .max_retries(20)
            .delay(Duration::from_millis(500))
            .backoff(1.5)
            .max_delay(Duration::from_secs(5))
            .build(),
    );
    let mut resubscribe = supervisor.resubscriptions();
    let handle = supervisor.spawn();

    // The pre-restart subscription dies with the connection; the resubscribe
    // notification is what tells the service to issue a new one.
    let stream = bus.subscribe(&queue).await.expect("Failed to subscribe");
    drop(stream);

    container.stop().await.expect("Failed to stop broker");
    container.start().await.expect("Failed to restart broker");

    tokio::time::timeout(RECOVERY_TIMEOUT, resubscribe.recv())
        .await
        .expect("Timed out waiting for recovery")
        .expect("Supervisor dropped the resubscribe channel");
    assert!(bus.connection().is_ready());

    // Topology was redeclared, so the rebound queue routes immediately.
    let mut stream = bus.subscribe(&queue).await.expect("Failed to resubscribe");
    bus.publish(&user_deleted("u1"))
        .await
        .expect("Failed to publish after recovery");
    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.envelope.routing_key(), "user.deleted");
    delivery.ack().await.expect("Failed to ack");

    handle.shutdown().await;
    bus.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn connect_is_idempotent() {
    let (_broker, url) = start_broker().await;
    let bus = connect(&url).await;

    let connection = bus.connection();
    assert!(connection.is_ready());

    // A second connect on the same handle reuses the live connection.
    connection.connect().await.expect("Second connect failed");
    assert!(connection.is_ready());

    bus.disconnect().await;
    assert!(!connection.is_ready());
}
