//! Comment service: compensating cleanup for deleted users and movies.

use crate::confirmation;
use crate::records::CommentRecord;
use std::sync::Arc;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::EventBus;
use streamia_runtime::handler::{HandlerError, SagaRegistry, handler_fn};
use streamia_testing::InMemoryStore;

/// Handlers for the comment service's cleanup queues.
///
/// `user.deleted` removes the user's comments; `movie.deleted` removes the
/// movie's comments. Both are delete-by-filter, so redelivery is a no-op,
/// and both publish a `comments.cleared_for_*` confirmation only when
/// records were actually removed.
pub fn registry(bus: Arc<dyn EventBus>, store: Arc<InMemoryStore<CommentRecord>>) -> SagaRegistry {
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

                let count = store.delete_where(|c| &c.user_id == user_id);
                tracing::info!(user_id = %user_id, count, "Removed comments for deleted user");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::CommentsClearedForUser {
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

                let count = store.delete_where(|c| &c.movie_id == movie_id);
                tracing::info!(movie_id = %movie_id, count, "Removed comments for deleted movie");

                if count > 0 {
                    bus.publish(&confirmation(
                        DomainEvent::CommentsClearedForMovie {
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
