//! End-to-end cascade scenarios over the in-memory bus.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::float_cmp)]

use cascade_delete::notifications::{EmailRequest, LoggingMailer, Mailer};
use cascade_delete::records::{CommentRecord, FavoriteRecord, MovieRecord, RatingRecord};
use cascade_delete::wiring::{Platform, Stores};
use std::sync::Arc;
use std::time::Duration;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::{BoxFuture, EventBus};
use streamia_testing::InMemoryEventBus;

fn comment(comment_id: &str, user_id: &str, movie_id: &str) -> CommentRecord {
    CommentRecord {
        comment_id: comment_id.into(),
        user_id: user_id.into(),
        movie_id: movie_id.into(),
        text: "text".into(),
    }
}

fn favorite(favorite_id: &str, user_id: &str, movie_id: &str) -> FavoriteRecord {
    FavoriteRecord {
        favorite_id: favorite_id.into(),
        user_id: user_id.into(),
        movie_id: movie_id.into(),
    }
}

fn rating(user_id: &str, movie_id: &str, score: f64) -> RatingRecord {
    RatingRecord {
        user_id: user_id.into(),
        movie_id: movie_id.into(),
        score,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn spawn_platform(bus: &InMemoryEventBus, stores: &Stores) -> Platform {
    Platform::spawn(Arc::new(bus.clone()), stores, Arc::new(LoggingMailer))
        .await
        .expect("platform should spawn")
}

#[tokio::test]
async fn user_deletion_cascades_across_every_service() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    stores.comments.insert(comment("c1", "u1", "m1"));
    stores.comments.insert(comment("c2", "u1", "m2"));
    stores.comments.insert(comment("c3", "u2", "m1"));
    stores.favorites.insert(favorite("f1", "u1", "m1"));
    stores.ratings.insert(rating("u1", "m1", 4.0));
    stores.ratings.insert(rating("u2", "m1", 3.0));

    let platform = spawn_platform(&bus, &stores).await;

    bus.publish(
        &EventEnvelope::new(DomainEvent::UserDeleted {
            user_id: "u1".into(),
        })
        .with_correlation_id("saga-1"),
    )
    .await
    .expect("publish");
    settle().await;

    // Only the other user's records survive.
    assert_eq!(stores.comments.count_where(|c| c.user_id == "u1"), 0);
    assert_eq!(stores.comments.len(), 1);
    assert_eq!(stores.favorites.len(), 0);
    assert_eq!(stores.ratings.count_where(|r| r.user_id == "u1"), 0);
    assert_eq!(stores.ratings.len(), 1);

    // One confirmation per service, carrying the removal count and the
    // original correlation id.
    let comments_cleared = bus.published_of_type("comments.cleared_for_user");
    assert_eq!(comments_cleared.len(), 1);
    assert_eq!(
        comments_cleared[0].correlation_id.as_deref(),
        Some("saga-1")
    );
    match comments_cleared[0].event {
        DomainEvent::CommentsClearedForUser { ref user_id, count } => {
            assert_eq!(user_id, "u1");
            assert_eq!(count, 2);
        }
        ref other => panic!("unexpected event {other:?}"),
    }

    match bus.published_of_type("favorites.cleared_for_user")[0].event {
        DomainEvent::FavoritesClearedForUser { count, .. } => assert_eq!(count, 1),
        ref other => panic!("unexpected event {other:?}"),
    }
    match bus.published_of_type("ratings.cleared_for_user")[0].event {
        DomainEvent::RatingsClearedForUser { count, .. } => assert_eq!(count, 1),
        ref other => panic!("unexpected event {other:?}"),
    }

    platform.shutdown().await;
}

#[tokio::test]
async fn redelivered_user_deletion_is_idempotent() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    stores.comments.insert(comment("c1", "u1", "m1"));

    let platform = spawn_platform(&bus, &stores).await;

    let envelope = EventEnvelope::new(DomainEvent::UserDeleted {
        user_id: "u1".into(),
    });
    bus.publish(&envelope).await.expect("publish");
    bus.publish(&envelope).await.expect("publish");
    settle().await;

    assert!(stores.comments.is_empty());

    // The second delivery removed nothing, so it confirmed nothing.
    assert_eq!(bus.published_of_type("comments.cleared_for_user").len(), 1);

    platform.shutdown().await;
}

#[tokio::test]
async fn cleanup_with_no_records_publishes_no_confirmation() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();

    let platform = spawn_platform(&bus, &stores).await;

    bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
        user_id: "u-unknown".into(),
    }))
    .await
    .expect("publish");
    settle().await;

    assert!(bus.published_of_type("comments.cleared_for_user").is_empty());
    assert!(bus.published_of_type("favorites.cleared_for_user").is_empty());
    assert!(bus.published_of_type("ratings.cleared_for_user").is_empty());

    platform.shutdown().await;
}

#[tokio::test]
async fn movie_deletion_cascades_across_every_service() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    stores.comments.insert(comment("c1", "u1", "m1"));
    stores.comments.insert(comment("c2", "u2", "m1"));
    stores.comments.insert(comment("c3", "u1", "m2"));
    stores.favorites.insert(favorite("f1", "u1", "m1"));
    stores.ratings.insert(rating("u1", "m1", 4.0));

    let platform = spawn_platform(&bus, &stores).await;

    bus.publish(&EventEnvelope::new(DomainEvent::MovieDeleted {
        movie_id: "m1".into(),
        title: "Heat".into(),
        category: "crime".into(),
    }))
    .await
    .expect("publish");
    settle().await;

    assert_eq!(stores.comments.count_where(|c| c.movie_id == "m1"), 0);
    assert_eq!(stores.comments.len(), 1);
    assert!(stores.favorites.is_empty());
    assert!(stores.ratings.is_empty());

    match bus.published_of_type("comments.cleared_for_movie")[0].event {
        DomainEvent::CommentsClearedForMovie { count, .. } => assert_eq!(count, 2),
        ref other => panic!("unexpected event {other:?}"),
    }
    match bus.published_of_type("favorites.cleared_for_movie")[0].event {
        DomainEvent::FavoritesClearedForMovie { count, .. } => assert_eq!(count, 1),
        ref other => panic!("unexpected event {other:?}"),
    }
    match bus.published_of_type("ratings.cleared_for_movie")[0].event {
        DomainEvent::RatingsClearedForMovie { count, .. } => assert_eq!(count, 1),
        ref other => panic!("unexpected event {other:?}"),
    }

    platform.shutdown().await;
}

#[tokio::test]
async fn rating_events_fold_into_the_movie_aggregate() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    stores.movies.insert(MovieRecord {
        movie_id: "m1".into(),
        title: "Heat".into(),
        average_rating: 0.0,
        ratings_count: 0,
    });

    let platform = spawn_platform(&bus, &stores).await;

    bus.publish(&EventEnvelope::new(DomainEvent::RatingCreated {
        user_id: "u1".into(),
        movie_id: "m1".into(),
        score: 4.0,
        average_rating: 4.0,
        ratings_count: 1,
    }))
    .await
    .expect("publish");
    bus.publish(&EventEnvelope::new(DomainEvent::RatingUpdated {
        user_id: "u1".into(),
        movie_id: "m1".into(),
        score: 5.0,
        previous_score: 4.0,
        average_rating: 5.0,
        ratings_count: 1,
    }))
    .await
    .expect("publish");
    settle().await;

    let movie = &stores.movies.all()[0];
    assert_eq!(movie.average_rating, 5.0);
    assert_eq!(movie.ratings_count, 1);

    // A rating for an unknown movie is skipped, not an error.
    bus.publish(&EventEnvelope::new(DomainEvent::RatingDeleted {
        user_id: "u1".into(),
        movie_id: "m-gone".into(),
        score: 5.0,
        average_rating: 0.0,
        ratings_count: 0,
    }))
    .await
    .expect("publish");
    settle().await;
    assert_eq!(stores.movies.len(), 1);

    platform.shutdown().await;
}

#[tokio::test]
async fn email_requests_produce_sent_confirmations() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    let platform = spawn_platform(&bus, &stores).await;

    bus.publish(
        &EventEnvelope::new(DomainEvent::NotificationSendEmail {
            to: "ada@example.com".into(),
            subject: "Account deleted".into(),
            template: "account_deleted".into(),
            data: serde_json::json!({ "username": "ada" }),
        })
        .with_correlation_id("saga-2"),
    )
    .await
    .expect("publish");
    settle().await;

    let sent = bus.published_of_type("notification.sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].correlation_id.as_deref(), Some("saga-2"));
    match sent[0].event {
        DomainEvent::NotificationSent {
            ref to,
            ref template,
            ..
        } => {
            assert_eq!(to, "ada@example.com");
            assert_eq!(template, "account_deleted");
        }
        ref other => panic!("unexpected event {other:?}"),
    }
    assert!(bus.published_of_type("notification.failed").is_empty());

    platform.shutdown().await;
}

struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, request: EmailRequest) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(async move { Err(format!("mailbox unavailable: {}", request.to)) })
    }
}

#[tokio::test]
async fn failed_sends_produce_failed_events_and_do_not_wedge_the_queue() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    let platform = Platform::spawn(Arc::new(bus.clone()), &stores, Arc::new(FailingMailer))
        .await
        .expect("platform should spawn");

    bus.publish(&EventEnvelope::new(DomainEvent::NotificationSendEmail {
        to: "bad@example.com".into(),
        subject: "Welcome".into(),
        template: "welcome".into(),
        data: serde_json::json!({}),
    }))
    .await
    .expect("publish");
    settle().await;

    let failed = bus.published_of_type("notification.failed");
    assert_eq!(failed.len(), 1);
    match failed[0].event {
        DomainEvent::NotificationFailed { ref error, .. } => {
            assert!(error.contains("mailbox unavailable"));
        }
        ref other => panic!("unexpected event {other:?}"),
    }

    // The failure was handled and acknowledged.
    assert_eq!(bus.acked("notifications.email.queue"), 1);

    platform.shutdown().await;
}

#[tokio::test]
async fn shutdown_trigger_drains_the_platform_before_exit() {
    let bus = InMemoryEventBus::new();
    let stores = Stores::new();
    stores.comments.insert(comment("c1", "u1", "m1"));

    let platform = spawn_platform(&bus, &stores).await;
    let (trigger, tripped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(platform.run_until(async move {
        let _ = tripped.await;
    }));

    // The platform keeps dispatching while the shutdown future is pending.
    bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
        user_id: "u1".into(),
    }))
    .await
    .expect("publish");
    settle().await;
    assert!(stores.comments.is_empty());

    trigger.send(()).expect("platform should still be running");
    running.await.expect("drain should complete");

    assert_eq!(bus.acked("comments.user.queue"), 1);
}
