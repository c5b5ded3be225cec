//! Rating service: compensating cleanup for deleted users and movies.

use crate::confirmation;
use crate::records::RatingRecord;
use std::sync::Arc;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::EventBus;
use streamia_runtime::handler::{HandlerError, SagaRegistry, handler_fn};
use streamia_testing::InMemoryStore;

/// Handlers for the rating service's cleanup queues.
pub fn registry(bus: Arc<dyn EventBus>, store: Arc<InMemoryStore<RatingRecord>>) -> SagaRegistry {
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

                let count = store.delete_where(|r| &r.user_id == user_id);
                tracing::info!(user_id = %user_id, count, "Removed ratings for deleted user");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::RatingsClearedForUser {
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

                let count = store.delete_where(|r| &r.movie_id == movie_id);
                tracing::info!(movie_id = %movie_id, count, "Removed ratings for deleted movie");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::RatingsClearedForMovie {
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
