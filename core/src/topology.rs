//! Broker topology descriptions: exchange, queues, and bindings.
//!
//! The topology is declarative and declared idempotently at every service
//! startup: one durable topic exchange per deployment (`domain.events`), one
//! durable queue per (service, upstream-entity) pair, and a binding per
//! routing key the queue cares about. Once a deployment binds a queue to a
//! routing key, the binding stays for the life of the deployment; rebinding
//! is a topology change requiring all producers and consumers to redeploy
//! consistently.

use serde::{Deserialize, Serialize};

/// Name of the deployment's topic exchange.
pub const DEFAULT_EXCHANGE: &str = "domain.events";

/// Default per-consumer unacknowledged-message limit.
///
/// Bounds memory and gives basic backpressure against a slow handler.
pub const DEFAULT_PREFETCH: u16 = 10;

/// A topic exchange to declare at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSpec {
    /// Exchange name, fixed per deployment.
    pub name: String,
    /// Durable exchanges survive broker restarts. Always true in deployments;
    /// configurable for tests.
    pub durable: bool,
}

impl ExchangeSpec {
    /// A durable topic exchange with the given name.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }
}

impl Default for ExchangeSpec {
    fn default() -> Self {
        Self::topic(DEFAULT_EXCHANGE)
    }
}

/// A durable, service-scoped queue plus its bindings and consumer limits.
///
/// Built fluently:
///
/// ```
/// use streamia_core::topology::QueueSpec;
///
/// let queue = QueueSpec::new("comments.user.queue")
///     .bind("user.deleted")
///     .prefetch(10);
/// assert_eq!(queue.bindings, vec!["user.deleted".to_string()]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Queue name, conventionally `<service>.<concern>.queue`.
    pub name: String,
    /// Routing keys (event types) this queue is bound to.
    pub bindings: Vec<String>,
    /// Unacknowledged-message limit for this queue's consumer.
    pub prefetch: u16,
    /// Exchange that receives messages this queue rejects without requeue.
    /// `None` means rejected messages are dropped.
    pub dead_letter_exchange: Option<String>,
}

impl QueueSpec {
    /// A durable queue with no bindings and the default prefetch.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
            prefetch: DEFAULT_PREFETCH,
            dead_letter_exchange: None,
        }
    }

    /// Add a routing-key binding.
    #[must_use]
    pub fn bind(mut self, routing_key: impl Into<String>) -> Self {
        self.bindings.push(routing_key.into());
        self
    }

    /// Override the prefetch limit.
    #[must_use]
    pub const fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Route rejected (non-requeued) messages to a dead-letter exchange.
    #[must_use]
    pub fn dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

/// Build a queue name following the `<service>.<concern>.queue` convention.
///
/// One queue per (service, upstream-entity) pair lets consumer groups scale
/// and fail independently.
#[must_use]
pub fn queue_name(service: &str, concern: &str) -> String {
    format!("{service}.{concern}.queue")
}

/// Well-known queue names for the deployed services.
pub mod queues {
    /// Comment service, user-scoped cleanup.
    pub const COMMENTS_USER: &str = "comments.user.queue";
    /// Comment service, movie-scoped cleanup.
    pub const COMMENTS_MOVIE: &str = "comments.movie.queue";
    /// Favorites service, user-scoped cleanup.
    pub const FAVORITES_USER: &str = "favorites.user.queue";
    /// Favorites service, movie-scoped cleanup.
    pub const FAVORITES_MOVIE: &str = "favorites.movie.queue";
    /// Rating service, user-scoped cleanup.
    pub const RATINGS_USER: &str = "ratings.user.queue";
    /// Rating service, movie-scoped cleanup.
    pub const RATINGS_MOVIE: &str = "ratings.movie.queue";
    /// Movie service, rating-aggregate folds.
    pub const MOVIES_RATING: &str = "movies.rating.queue";
    /// Notification service, email dispatch.
    pub const NOTIFICATIONS_EMAIL: &str = "notifications.email.queue";
}

/// AMQP topic-pattern matching.
///
/// Patterns and keys are dot-separated words; `*` matches exactly one word
/// and `#` matches zero or more words. Exact keys are the common case in
/// this deployment (`user.deleted`), but the in-memory broker emulation
/// honors the full semantics so wildcard bindings behave like the real
/// exchange.
///
/// ```
/// use streamia_core::topology::topic_matches;
///
/// assert!(topic_matches("user.deleted", "user.deleted"));
/// assert!(topic_matches("rating.*", "rating.created"));
/// assert!(topic_matches("#", "anything.at.all"));
/// assert!(!topic_matches("rating.*", "rating"));
/// ```
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some((&"#", rest)) => (0..=key.len()).any(|skip| matches(rest, &key[skip..])),
            Some((&"*", rest)) => !key.is_empty() && matches(rest, &key[1..]),
            Some((word, rest)) => key.first() == Some(word) && matches(rest, &key[1..]),
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}
