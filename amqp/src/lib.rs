//! # Streamia AMQP
//!
//! AMQP 0-9-1 transport for the Streamia event backbone, implementing the
//! [`EventBus`](streamia_core::event_bus::EventBus) trait from
//! `streamia-core` over a single durable topic exchange.
//!
//! # Delivery Semantics
//!
//! **At-least-once**, per message:
//!
//! - publishes are persistent (delivery mode 2) but not confirmed; a broker
//!   handoff counts as published
//! - queues are durable and acknowledged manually; what happens after a
//!   handler failure is the dispatcher's acknowledgement policy, not the
//!   transport's
//! - a dropped connection redelivers everything unacknowledged, so handlers
//!   must be idempotent
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   connection_lost    ┌──────────────────────┐
//! │  BrokerConnection  │─────────────────────▶│ ConnectionSupervisor │
//! │  (conn + channel)  │◀─────────────────────│ reconnect, redeclare │
//! └─────────┬──────────┘      reconnect       └──────────┬───────────┘
//!           │                                            │ broadcast
//!           ▼                                            ▼
//! ┌────────────────────┐                        ┌─────────────────┐
//! │   AmqpEventBus     │                        │   subscribers   │
//! │ publish/subscribe  │◀───────────────────────│  (resubscribe)  │
//! └────────────────────┘                        └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use streamia_amqp::{AmqpEventBus, ConnectionSupervisor};
//! use streamia_core::config::BusConfig;
//! use streamia_core::event_bus::EventBus;
//! use streamia_core::topology::{ExchangeSpec, QueueSpec, queues};
//! use streamia_runtime::retry::{RetryPolicy, retry_with_backoff};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BusConfig::from_env("comment-service");
//!
//! // Broker bring-up is retried; everything after connect is fail-fast.
//! let bus = retry_with_backoff(RetryPolicy::default(), || {
//!     AmqpEventBus::connect(config.clone())
//! })
//! .await?;
//!
//! let queue = QueueSpec::new(queues::COMMENTS_USER).bind("user.deleted");
//! let supervisor = ConnectionSupervisor::new(
//!     bus.connection(),
//!     ExchangeSpec::topic(config.exchange.clone()),
//! )
//! .watch_queue(queue.clone());
//! let resubscribe = supervisor.resubscriptions();
//! let supervisor = supervisor.spawn();
//!
//! let stream = bus.subscribe(&queue).await?;
//! # drop((stream, resubscribe, supervisor));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Broker connection lifecycle.
pub mod connection;

/// Idempotent exchange, queue, and binding declaration.
pub mod topology;

/// The [`EventBus`](streamia_core::event_bus::EventBus) implementation.
pub mod bus;

/// Reconnect-and-redeclare supervision.
pub mod supervisor;

pub use bus::AmqpEventBus;
pub use connection::BrokerConnection;
pub use supervisor::{ConnectionSupervisor, SupervisorHandle};
pub use topology::{declare_all, declare_exchange, declare_queue};
