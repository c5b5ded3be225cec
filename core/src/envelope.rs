//! Typed domain events and the envelope that carries them on the wire.
//!
//! The wire format is UTF-8 JSON with the event type doubling as the routing
//! key:
//!
//! ```json
//! {
//!   "type": "user.deleted",
//!   "payload": { "userId": "u1" },
//!   "emittedAt": "2025-01-01T00:00:00Z",
//!   "correlationId": "7c9e6679-7425-40de-944b-e07fc1f90ae7"
//! }
//! ```
//!
//! Payloads are a closed set: each event type is a distinct enum variant with
//! a compile-time-checked shape, so handlers never reach into untyped maps.
//! An event type the deserializer does not know is a decode error, which the
//! transport treats as a poison message (logged and acknowledged so the queue
//! keeps moving).
//!
//! `emittedAt` is set by the publisher for observability only; it carries no
//! ordering guarantee. `correlationId` is unique per logical business
//! operation and lets a saga be traced across service boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from encoding or decoding an [`EventEnvelope`].
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The envelope could not be serialized to JSON.
    #[error("Failed to encode event envelope: {0}")]
    Encode(String),

    /// The bytes were not a valid envelope (malformed JSON, unknown event
    /// type, or a payload shape mismatch).
    #[error("Failed to decode event envelope: {0}")]
    Decode(String),
}

/// The closed set of domain events exchanged between Streamia services.
///
/// The serialized form is adjacently tagged: the variant name becomes the
/// `type` field (and the AMQP routing key), the fields become the `payload`
/// object with camelCase keys.
///
/// # Conventions
///
/// - `<entity>.<verb>` for domain facts (`user.deleted`, `rating.created`)
/// - `<service>.cleared_for_<entity>` for saga cleanup confirmations, carrying
///   the number of records removed
/// - `notification.*` for the email dispatch flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DomainEvent {
    /// A user account was deleted; dependent services must clean up.
    #[serde(rename = "user.deleted", rename_all = "camelCase")]
    UserDeleted {
        /// Identifier of the deleted user.
        user_id: String,
    },

    /// A movie was added to the catalog.
    #[serde(rename = "movie.created", rename_all = "camelCase")]
    MovieCreated {
        /// Identifier of the new movie.
        movie_id: String,
        /// Display title.
        title: String,
        /// Catalog category.
        category: String,
        /// Playback URL of the uploaded video.
        video_url: String,
    },

    /// Movie metadata changed.
    #[serde(rename = "movie.updated", rename_all = "camelCase")]
    MovieUpdated {
        /// Identifier of the movie.
        movie_id: String,
        /// Names of the fields that changed.
        updates: Vec<String>,
    },

    /// A movie was removed; dependent services must clean up.
    #[serde(rename = "movie.deleted", rename_all = "camelCase")]
    MovieDeleted {
        /// Identifier of the deleted movie.
        movie_id: String,
        /// Display title at deletion time.
        title: String,
        /// Catalog category at deletion time.
        category: String,
    },

    /// A movie's video asset finished uploading.
    #[serde(rename = "movie.video_uploaded", rename_all = "camelCase")]
    MovieVideoUploaded {
        /// Identifier of the movie.
        movie_id: String,
        /// Video duration in seconds.
        duration: u64,
        /// Container format of the uploaded asset.
        format: String,
    },

    /// A rating was created. Carries the recomputed aggregate so the movie
    /// service can fold it into its own store without a second lookup.
    #[serde(rename = "rating.created", rename_all = "camelCase")]
    RatingCreated {
        /// User who rated.
        user_id: String,
        /// Movie that was rated.
        movie_id: String,
        /// The score given.
        score: f64,
        /// New average rating for the movie.
        average_rating: f64,
        /// New total number of ratings for the movie.
        ratings_count: u64,
    },

    /// A rating was changed.
    #[serde(rename = "rating.updated", rename_all = "camelCase")]
    RatingUpdated {
        /// User who rated.
        user_id: String,
        /// Movie that was rated.
        movie_id: String,
        /// The new score.
        score: f64,
        /// The score before the change.
        previous_score: f64,
        /// New average rating for the movie.
        average_rating: f64,
        /// New total number of ratings for the movie.
        ratings_count: u64,
    },

    /// A rating was removed.
    #[serde(rename = "rating.deleted", rename_all = "camelCase")]
    RatingDeleted {
        /// User whose rating was removed.
        user_id: String,
        /// Movie the rating belonged to.
        movie_id: String,
        /// The score that was removed.
        score: f64,
        /// New average rating for the movie.
        average_rating: f64,
        /// New total number of ratings for the movie.
        ratings_count: u64,
    },

    /// A comment was posted.
    #[serde(rename = "comment.created", rename_all = "camelCase")]
    CommentCreated {
        /// Identifier of the comment.
        comment_id: String,
        /// Author of the comment.
        user_id: String,
        /// Movie the comment belongs to.
        movie_id: String,
        /// Comment body.
        text: String,
    },

    /// A comment was edited.
    #[serde(rename = "comment.updated", rename_all = "camelCase")]
    CommentUpdated {
        /// Identifier of the comment.
        comment_id: String,
        /// Author of the comment.
        user_id: String,
        /// Movie the comment belongs to.
        movie_id: String,
        /// New comment body.
        text: String,
    },

    /// A comment was removed by its author.
    #[serde(rename = "comment.deleted", rename_all = "camelCase")]
    CommentDeleted {
        /// Identifier of the comment.
        comment_id: String,
        /// Author of the comment.
        user_id: String,
        /// Movie the comment belonged to.
        movie_id: String,
    },

    /// A movie was added to a user's favorites.
    #[serde(rename = "favorites.added", rename_all = "camelCase")]
    FavoriteAdded {
        /// Owner of the favorites list.
        user_id: String,
        /// Movie that was favorited.
        movie_id: String,
        /// Identifier of the favorite record.
        favorite_id: String,
    },

    /// A movie was removed from a user's favorites.
    #[serde(rename = "favorites.removed", rename_all = "camelCase")]
    FavoriteRemoved {
        /// Owner of the favorites list.
        user_id: String,
        /// Movie that was unfavorited.
        movie_id: String,
        /// Identifier of the favorite record.
        favorite_id: String,
    },

    /// The note on a favorite was changed.
    #[serde(rename = "favorites.updated", rename_all = "camelCase")]
    FavoriteUpdated {
        /// Owner of the favorites list.
        user_id: String,
        /// Movie the favorite refers to.
        movie_id: String,
        /// Identifier of the favorite record.
        favorite_id: String,
        /// The new note.
        note: String,
    },

    /// Confirmation: the comment service removed a deleted user's comments.
    #[serde(rename = "comments.cleared_for_user", rename_all = "camelCase")]
    CommentsClearedForUser {
        /// The deleted user.
        user_id: String,
        /// Number of comments removed.
        count: u64,
    },

    /// Confirmation: the comment service removed a deleted movie's comments.
    #[serde(rename = "comments.cleared_for_movie", rename_all = "camelCase")]
    CommentsClearedForMovie {
        /// The deleted movie.
        movie_id: String,
        /// Number of comments removed.
        count: u64,
    },

    /// Confirmation: the favorites service removed a deleted user's favorites.
    #[serde(rename = "favorites.cleared_for_user", rename_all = "camelCase")]
    FavoritesClearedForUser {
        /// The deleted user.
        user_id: String,
        /// Number of favorites removed.
        count: u64,
    },

    /// Confirmation: the favorites service removed a deleted movie's favorites.
    #[serde(rename = "favorites.cleared_for_movie", rename_all = "camelCase")]
    FavoritesClearedForMovie {
        /// The deleted movie.
        movie_id: String,
        /// Number of favorites removed.
        count: u64,
    },

    /// Confirmation: the rating service removed a deleted user's ratings.
    #[serde(rename = "ratings.cleared_for_user", rename_all = "camelCase")]
    RatingsClearedForUser {
        /// The deleted user.
        user_id: String,
        /// Number of ratings removed.
        count: u64,
    },

    /// Confirmation: the rating service removed a deleted movie's ratings.
    #[serde(rename = "ratings.cleared_for_movie", rename_all = "camelCase")]
    RatingsClearedForMovie {
        /// The deleted movie.
        movie_id: String,
        /// Number of ratings removed.
        count: u64,
    },

    /// Request to the notification service to send an email.
    #[serde(rename = "notification.send_email", rename_all = "camelCase")]
    NotificationSendEmail {
        /// Recipient address.
        to: String,
        /// Subject line.
        subject: String,
        /// Template name (`welcome`, `password_reset`, `account_deleted`, ...).
        template: String,
        /// Template data; shape is template-specific.
        data: serde_json::Value,
    },

    /// The notification service delivered an email.
    #[serde(rename = "notification.sent", rename_all = "camelCase")]
    NotificationSent {
        /// Recipient address.
        to: String,
        /// Template that was rendered.
        template: String,
        /// Delivery timestamp.
        sent_at: DateTime<Utc>,
    },

    /// The notification service failed to deliver an email.
    #[serde(rename = "notification.failed", rename_all = "camelCase")]
    NotificationFailed {
        /// Recipient address.
        to: String,
        /// Template that was attempted.
        template: String,
        /// Failure description.
        error: String,
        /// Failure timestamp.
        failed_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// The dot-namespaced event type identifier.
    ///
    /// This string is the AMQP routing key and the dispatch key in the saga
    /// registry; it must match the serialized `type` field exactly.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserDeleted { .. } => "user.deleted",
            Self::MovieCreated { .. } => "movie.created",
            Self::MovieUpdated { .. } => "movie.updated",
            Self::MovieDeleted { .. } => "movie.deleted",
            Self::MovieVideoUploaded { .. } => "movie.video_uploaded",
            Self::RatingCreated { .. } => "rating.created",
            Self::RatingUpdated { .. } => "rating.updated",
            Self::RatingDeleted { .. } => "rating.deleted",
            Self::CommentCreated { .. } => "comment.created",
            Self::CommentUpdated { .. } => "comment.updated",
            Self::CommentDeleted { .. } => "comment.deleted",
            Self::FavoriteAdded { .. } => "favorites.added",
            Self::FavoriteRemoved { .. } => "favorites.removed",
            Self::FavoriteUpdated { .. } => "favorites.updated",
            Self::CommentsClearedForUser { .. } => "comments.cleared_for_user",
            Self::CommentsClearedForMovie { .. } => "comments.cleared_for_movie",
            Self::FavoritesClearedForUser { .. } => "favorites.cleared_for_user",
            Self::FavoritesClearedForMovie { .. } => "favorites.cleared_for_movie",
            Self::RatingsClearedForUser { .. } => "ratings.cleared_for_user",
            Self::RatingsClearedForMovie { .. } => "ratings.cleared_for_movie",
            Self::NotificationSendEmail { .. } => "notification.send_email",
            Self::NotificationSent { .. } => "notification.sent",
            Self::NotificationFailed { .. } => "notification.failed",
        }
    }
}

/// The unit of communication on the bus: a typed event plus tracing metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// The domain event. Serialized as the `type` and `payload` fields.
    #[serde(flatten)]
    pub event: DomainEvent,

    /// When the publisher emitted the event. Observability only, not used
    /// for ordering.
    pub emitted_at: DateTime<Utc>,

    /// Unique per logical business operation; lets duplicate deliveries be
    /// detected and a saga be traced across services. Optional because older
    /// producers do not send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl EventEnvelope {
    /// Wrap an event for publishing, stamping the current time and a fresh
    /// v4 correlation id.
    #[must_use]
    pub fn new(event: DomainEvent) -> Self {
        Self {
            event,
            emitted_at: Utc::now(),
            correlation_id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Replace the generated correlation id, to continue an existing saga.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Replace the emission timestamp (deterministic tests).
    #[must_use]
    pub const fn with_emitted_at(mut self, emitted_at: DateTime<Utc>) -> Self {
        self.emitted_at = emitted_at;
        self
    }

    /// The routing key this envelope publishes under.
    #[must_use]
    pub fn routing_key(&self) -> &'static str {
        self.event.event_type()
    }

    /// Serialize to the UTF-8 JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails, which only
    /// happens for non-string-keyed template data in `notification.send_email`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Deserialize from the UTF-8 JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] for malformed JSON, an event type
    /// outside the known catalog, or a payload that does not match the
    /// type's shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))
    }
}
