//! Favorites service: compensating cleanup for deleted users and movies.

use crate::confirmation;
use crate::records::FavoriteRecord;
use std::sync::Arc;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::EventBus;
use streamia_runtime::handler::{HandlerError, SagaRegistry, handler_fn};
use streamia_testing::InMemoryStore;

/// Handlers for the favorites service's cleanup queues.
pub fn registry(bus: Arc<dyn EventBus>, store: Arc<InMemoryStore<FavoriteRecord>>) -> SagaRegistry {
    let mut registry = SagaRegistry::new();

    let user_bus = Arc::clone(&bus);
    let user_store = Arc::clone(&store);
    registry.register(
        "user.deleted",
        handler_fn(move |envelope: EventEnvelope| {
            let bus = Arc::clone(&user_bus);
            let store = Arc::clone(&user_store);
            async move {
                let DomainEvent::UserDeleted { user_id } = &envelope.event else {
                    return Err(HandlerError::Other(format!(
                        "unexpected event type {}",
                        envelope.event.event_type()
                    )));
                };

                let count = store.delete_where(|f| &f.user_id == user_id);
                tracing::info!(user_id = %user_id, count, "Removed favorites for deleted user");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::FavoritesClearedForUser {
                            user_id: user_id.clone(),
                            count,
                        },
                        &envelope,
                    ))
                    .await?;
                }
                Ok(())
            }
        }),
    );

    registry.register(
        "movie.deleted",
        handler_fn(move |envelope: EventEnvelope| {
            let bus = Arc::clone(&bus);
            let store = Arc::clone(&store);
            async move {
                let DomainEvent::MovieDeleted { movie_id, .. } = &envelope.event else {
                    return Err(HandlerError::Other(format!(
                        "unexpected event type {}",
                        envelope.event.event_type()
                    )));
                };

                let count = store.delete_where(|f| &f.movie_id == movie_id);
                tracing::info!(movie_id = %movie_id, count, "Removed favorites for deleted movie");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::FavoritesClearedForMovie {
                            movie_id: movie_id.clone(),
                            count,
                        },
                        &envelope,
                    ))
                    .await?;
                }
                Ok(())
            }
        }),
    );

    registry
}
