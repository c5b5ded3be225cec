//! Movie service: folds `rating.*` events into its denormalized aggregate.
//!
//! The rating service recomputes the average and count on every change and
//! ships them in the event, so the fold here is a plain overwrite; applying
//! the same event twice writes the same values, keeping the handler
//! idempotent without tracking correlation ids.

use crate::records::MovieRecord;
use std::sync::Arc;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_runtime::handler::{HandlerError, SagaRegistry, handler_fn};
use streamia_testing::InMemoryStore;

fn fold(
    store: &InMemoryStore<MovieRecord>,
    movie_id: &str,
    average_rating: f64,
    ratings_count: u64,
) -> u64 {
    store.update_where(
        |m| m.movie_id == movie_id,
        |m| {
            m.average_rating = average_rating;
            m.ratings_count = ratings_count;
        },
    )
}

/// Handlers for the movie service's rating-aggregate queue.
///
/// All three rating events carry the recomputed aggregate, so one handler
/// body serves them all. A rating for an unknown movie is not an error
/// (the movie may already be deleted); it is logged and acknowledged.
pub fn registry(store: Arc<InMemoryStore<MovieRecord>>) -> SagaRegistry {
    let mut registry = SagaRegistry::new();

    for event_type in ["rating.created", "rating.updated", "rating.deleted"] {
        let store = Arc::clone(&store);
        registry.register(
            event_type,
            handler_fn(move |envelope: EventEnvelope| {
                let store = Arc::clone(&store);
                async move {
                    let (movie_id, average_rating, ratings_count) = match &envelope.event {
                        DomainEvent::RatingCreated {
                            movie_id,
                            average_rating,
                            ratings_count,
                            ..
                        }
                        | DomainEvent::RatingUpdated {
                            movie_id,
                            average_rating,
                            ratings_count,
                            ..
                        }
                        | DomainEvent::RatingDeleted {
                            movie_id,
                            average_rating,
                            ratings_count,
                            ..
                        } => (movie_id, *average_rating, *ratings_count),
                        other => {
                            return Err(HandlerError::Other(format!(
                                "unexpected event type {}",
                                other.event_type()
                            )));
                        }
                    };

                    let touched = fold(&store, movie_id, average_rating, ratings_count);
                    if touched == 0 {
                        tracing::warn!(
                            movie_id = %movie_id,
                            "Rating event for unknown movie, skipping"
                        );
                    } else {
                        tracing::debug!(
                            movie_id = %movie_id,
                            average_rating,
                            ratings_count,
                            "Folded rating aggregate"
                        );
                    }
                    Ok(())
                }
            }),
        );
    }

    registry
}
