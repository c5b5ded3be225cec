//! # Streamia Core
//!
//! Core types and trait seams for the Streamia event backbone.
//!
//! The Streamia platform is a set of independently deployed services (users,
//! movies, comments, favorites, ratings, notifications), each owning its own
//! data store. Cross-service referential integrity (deleting a user must also
//! remove that user's comments, favorites, and ratings) is coordinated with a
//! saga-style compensation protocol over a topic exchange instead of a
//! distributed transaction.
//!
//! This crate defines the pieces every service shares:
//!
//! - [`envelope`]: the typed [`DomainEvent`](envelope::DomainEvent) catalog
//!   and the [`EventEnvelope`](envelope::EventEnvelope) wire format
//! - [`event_bus`]: the [`EventBus`](event_bus::EventBus) trait plus the
//!   [`Delivery`](event_bus::Delivery)/[`Acker`](event_bus::Acker) seam that
//!   carries per-message acknowledgement across transports
//! - [`topology`]: exchange/queue/binding descriptions and the topic-pattern
//!   matcher used by the in-memory broker emulation
//! - [`config`]: externally supplied bus configuration (broker URL, service
//!   name, prefetch)
//!
//! Transport implementations live in separate crates (`streamia-amqp` for
//! production, `streamia-testing` for tests); the broker-agnostic dispatch
//! loop and retry helper live in `streamia-runtime`.
//!
//! # Delivery Semantics
//!
//! The transport guarantees **at-least-once** delivery: a message is
//! delivered one or more times, never zero, absent catastrophic failure.
//! Every saga handler must therefore be idempotent: cleanup is written as
//! delete-by-filter so that repeating it against an already-cleaned store is
//! a no-op.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Bus configuration supplied by the process environment.
pub mod config;

/// Typed domain events and the JSON envelope that carries them.
pub mod envelope;

/// Event bus trait, delivery/acknowledgement seam, and error taxonomy.
pub mod event_bus;

/// Exchange/queue/binding descriptions and topic-pattern matching.
pub mod topology;

pub use config::BusConfig;
pub use envelope::{DomainEvent, EnvelopeError, EventEnvelope};
pub use event_bus::{Acker, BoxFuture, Delivery, DeliveryStream, EventBus, EventBusError};
pub use topology::{ExchangeSpec, QueueSpec, topic_matches};
