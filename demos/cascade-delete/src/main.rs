//! Runs the cascade on the in-memory bus and logs what happens, then stays
//! up until Ctrl-C or SIGTERM, draining every dispatcher before exit.
//!
//! ```bash
//! RUST_LOG=info cargo run -p cascade-delete
//! ```

use anyhow::Result;
use cascade_delete::notifications::LoggingMailer;
use cascade_delete::records::{CommentRecord, FavoriteRecord, RatingRecord};
use cascade_delete::wiring::{Platform, Stores};
use std::sync::Arc;
use std::time::Duration;
use streamia_core::envelope::{DomainEvent, EventEnvelope};
use streamia_core::event_bus::EventBus;
use streamia_testing::InMemoryEventBus;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bus = InMemoryEventBus::new();
    let stores = Stores::new();

    stores.comments.insert(CommentRecord {
        comment_id: "c1".into(),
        user_id: "u1".into(),
        movie_id: "m1".into(),
        text: "Loved it".into(),
    });
    stores.comments.insert(CommentRecord {
        comment_id: "c2".into(),
        user_id: "u1".into(),
        movie_id: "m2".into(),
        text: "Not bad".into(),
    });
    stores.favorites.insert(FavoriteRecord {
        favorite_id: "f1".into(),
        user_id: "u1".into(),
        movie_id: "m1".into(),
    });
    stores.ratings.insert(RatingRecord {
        user_id: "u1".into(),
        movie_id: "m1".into(),
        score: 4.5,
    });

    let platform = Platform::spawn(Arc::new(bus.clone()), &stores, Arc::new(LoggingMailer)).await?;

    tracing::info!("Deleting user u1");
    bus.publish(&EventEnvelope::new(DomainEvent::UserDeleted {
        user_id: "u1".into(),
    }))
    .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    tracing::info!(
        comments = stores.comments.len(),
        favorites = stores.favorites.len(),
        ratings = stores.ratings.len(),
        confirmations = bus.published().len(),
        "Cascade complete"
    );

    tracing::info!("Platform running, press Ctrl-C (or send SIGTERM) to stop");
    platform.run_until(shutdown_signal()).await;
    tracing::info!("Drained, exiting");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
