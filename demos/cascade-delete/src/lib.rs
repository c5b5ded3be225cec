//! # Cascade Delete
//!
//! The complete cascading-delete saga across the Streamia services, wired
//! over one event bus:
//!
//! - `user.deleted` fans out to the comment, favorites, and rating services;
//!   each removes the user's records and, when anything was removed,
//!   publishes its `*.cleared_for_user` confirmation
//! - `movie.deleted` does the same per movie
//! - `rating.created`/`updated`/`deleted` fold the recomputed aggregate into
//!   the movie service's denormalized store
//! - `notification.send_email` drives the email flow and reports
//!   `notification.sent` or `notification.failed`
//!
//! There is no saga coordinator: each service owns its compensation, the
//! confirmations are an audit trail, and consistency is eventual. Every
//! cleanup is delete-by-filter and therefore idempotent under at-least-once
//! delivery.
//!
//! # Example
//!
//! ```
//! use cascade_delete::notifications::LoggingMailer;
//! use cascade_delete::records::CommentRecord;
//! use cascade_delete::wiring::{Platform, Stores};
//! use std::sync::Arc;
//! use streamia_core::envelope::{DomainEvent, EventEnvelope};
//! use streamia_core::event_bus::EventBus;
//! use streamia_testing::InMemoryEventBus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryEventBus::new();
//! let stores = Stores::new();
//! stores.comments.insert(CommentRecord {
//!     comment_id: "c1".into(),
//!     user_id: "u1".into(),
//!     movie_id: "m1".into(),
//!     text: "great".into(),
//! });
//!
//! let platform = Platform::spawn(
//!     Arc::new(bus.clone()),
//!     &stores,
//!     Arc::new(LoggingMailer),
//! )
//! .await?;
//!
//! bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
//!     user_id: "u1".into(),
//! }))
//! .await?;
//!
//! tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! assert!(stores.comments.is_empty());
//! platform.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Record shapes for each service's store.
pub mod records;

/// Comment service handlers.
pub mod comments;

/// Favorites service handlers.
pub mod favorites;

/// Rating service handlers.
pub mod ratings;

/// Movie service rating-aggregate handlers.
pub mod movies;

/// Notification service handlers and the [`Mailer`](notifications::Mailer)
/// seam.
pub mod notifications;

/// Service wiring over one bus.
pub mod wiring;

use streamia_core::envelope::{DomainEvent, EventEnvelope};

/// Wrap a follow-up event, continuing the causing envelope's correlation id
/// so the saga stays traceable across services.
#[must_use]
pub fn confirmation(event: DomainEvent, cause: &EventEnvelope) -> EventEnvelope {
    match &cause.correlation_id {
        Some(correlation_id) => EventEnvelope::new(event).with_correlation_id(correlation_id.clone()),
        None => EventEnvelope::new(event),
    }
}
