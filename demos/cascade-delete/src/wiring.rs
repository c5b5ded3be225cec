//! Explicit wiring of every service onto one bus.
//!
//! Each dependency is passed in; nothing is a process-wide singleton. Two
//! instances of the platform with separate stores and buses can coexist in
//! one process, which is exactly what the integration tests do.

use crate::notifications::Mailer;
use crate::records::{CommentRecord, FavoriteRecord, MovieRecord, RatingRecord};
use crate::{comments, favorites, movies, notifications, ratings};
use std::future::Future;
use std::sync::Arc;
use streamia_core::event_bus::{EventBus, EventBusError};
use streamia_core::topology::{QueueSpec, queues};
use streamia_runtime::dispatcher::{AckPolicy, Dispatcher, DispatcherHandle};
use streamia_testing::InMemoryStore;

/// Every service's backing store.
#[derive(Default)]
pub struct Stores {
    /// Comment service records.
    pub comments: Arc<InMemoryStore<CommentRecord>>,
    /// Favorites service records.
    pub favorites: Arc<InMemoryStore<FavoriteRecord>>,
    /// Rating service records.
    pub ratings: Arc<InMemoryStore<RatingRecord>>,
    /// Movie service records.
    pub movies: Arc<InMemoryStore<MovieRecord>>,
}

impl Stores {
    /// Empty stores for every service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The running platform: one dispatcher per queue.
pub struct Platform {
    handles: Vec<DispatcherHandle>,
}

impl Platform {
    /// Subscribe every service queue and spawn its dispatcher.
    ///
    /// Queue topology matches the deployment: one queue per (service,
    /// upstream-entity) pair, every cleanup queue on the ack-always policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`EventBusError`] from a failed subscription.
    pub async fn spawn(
        bus: Arc<dyn EventBus>,
        stores: &Stores,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, EventBusError> {
        let mut handles = Vec::new();

        for (queue_name, binding) in [
            (queues::COMMENTS_USER, "user.deleted"),
            (queues::COMMENTS_MOVIE, "movie.deleted"),
        ] {
            let stream = bus.subscribe(&QueueSpec::new(queue_name).bind(binding)).await?;
            let registry = comments::registry(Arc::clone(&bus), Arc::clone(&stores.comments));
            handles.push(Dispatcher::new(queue_name, registry, AckPolicy::AckAlways).spawn(stream));
        }

        for (queue_name, binding) in [
            (queues::FAVORITES_USER, "user.deleted"),
            (queues::FAVORITES_MOVIE, "movie.deleted"),
        ] {
            let stream = bus.subscribe(&QueueSpec::new(queue_name).bind(binding)).await?;
            let registry = favorites::registry(Arc::clone(&bus), Arc::clone(&stores.favorites));
            handles.push(Dispatcher::new(queue_name, registry, AckPolicy::AckAlways).spawn(stream));
        }

        for (queue_name, binding) in [
            (queues::RATINGS_USER, "user.deleted"),
            (queues::RATINGS_MOVIE, "movie.deleted"),
        ] {
            let stream = bus.subscribe(&QueueSpec::new(queue_name).bind(binding)).await?;
            let registry = ratings::registry(Arc::clone(&bus), Arc::clone(&stores.ratings));
            handles.push(Dispatcher::new(queue_name, registry, AckPolicy::AckAlways).spawn(stream));
        }

        let rating_queue = QueueSpec::new(queues::MOVIES_RATING)
            .bind("rating.created")
            .bind("rating.updated")
            .bind("rating.deleted");
        let stream = bus.subscribe(&rating_queue).await?;
        let registry = movies::registry(Arc::clone(&stores.movies));
        handles.push(
            Dispatcher::new(queues::MOVIES_RATING, registry, AckPolicy::AckAlways).spawn(stream),
        );

        let email_queue = QueueSpec::new(queues::NOTIFICATIONS_EMAIL).bind("notification.send_email");
        let stream = bus.subscribe(&email_queue).await?;
        let registry = notifications::registry(Arc::clone(&bus), mailer);
        handles.push(
            Dispatcher::new(queues::NOTIFICATIONS_EMAIL, registry, AckPolicy::AckAlways)
                .spawn(stream),
        );

        Ok(Self { handles })
    }

    /// Run until `shutdown` resolves, then drain every dispatcher.
    ///
    /// The entry point passes its process-signal future here, so Ctrl-C and
    /// SIGTERM end with drained queues instead of a hard exit. In-flight
    /// handlers finish; anything unacknowledged is redelivered on the next
    /// start.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        shutdown.await;
        tracing::info!("Shutdown signal received, draining dispatchers");
        self.shutdown().await;
    }

    /// Drain and stop every dispatcher.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(err) = handle.shutdown().await {
                tracing::warn!(error = %err, "Dispatcher shutdown failed");
            }
        }
    }
}
