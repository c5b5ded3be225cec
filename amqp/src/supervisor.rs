//! Connection supervision: reconnect, redeclare, resubscribe.
//!
//! A consumer stream dies silently when its connection drops, so recovery is
//! supervised explicitly rather than hidden inside the transport. The
//! supervisor waits for the connection-lost signal, reconnects under the
//! startup retry policy, redeclares the full topology, and then broadcasts a
//! resubscribe notification. Services listen on the broadcast and re-issue
//! their `subscribe` calls; in-flight unacknowledged messages from before
//! the drop are redelivered by the broker.

use crate::connection::BrokerConnection;
use crate::topology;
use std::sync::Arc;
use streamia_core::event_bus::EventBusError;
use streamia_core::topology::{ExchangeSpec, QueueSpec};
use streamia_runtime::retry::{RetryPolicy, retry_with_predicate};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Capacity of the resubscribe broadcast channel. Reconnects are rare; a
/// lagged receiver treats the lag as a missed notification and resubscribes.
const RESUBSCRIBE_CAPACITY: usize = 4;

/// Supervises one broker connection for the life of the process.
pub struct ConnectionSupervisor {
    connection: Arc<BrokerConnection>,
    exchange: ExchangeSpec,
    queues: Vec<QueueSpec>,
    policy: RetryPolicy,
    resubscribe: broadcast::Sender<()>,
}

impl ConnectionSupervisor {
    /// A supervisor for `connection`, redeclaring `exchange` after each
    /// reconnect. Queues to redeclare are added with
    /// [`watch_queue`](Self::watch_queue).
    #[must_use]
    pub fn new(connection: Arc<BrokerConnection>, exchange: ExchangeSpec) -> Self {
        let (resubscribe, _) = broadcast::channel(RESUBSCRIBE_CAPACITY);
        Self {
            connection,
            exchange,
            queues: Vec::new(),
            policy: RetryPolicy::default(),
            resubscribe,
        }
    }

    /// Redeclare `queue` after each reconnect.
    #[must_use]
    pub fn watch_queue(mut self, queue: QueueSpec) -> Self {
        self.queues.push(queue);
        self
    }

    /// Override the reconnection retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Receiver for resubscribe notifications, one per successful recovery.
    /// Each subscribing component takes its own receiver before
    /// [`spawn`](Self::spawn).
    #[must_use]
    pub fn resubscriptions(&self) -> broadcast::Receiver<()> {
        self.resubscribe.subscribe()
    }

    /// Spawn the supervision loop.
    #[must_use]
    pub fn spawn(self) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SupervisorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Supervisor shutting down");
                        return;
                    }
                }
                () = self.connection.connection_lost() => {
                    if self.connection.is_ready() {
                        // Stale signal from a connection already replaced.
                        continue;
                    }
                    tracing::warn!("Broker connection lost, recovering");
                    if !self.recover().await {
                        return;
                    }
                }
            }
        }
    }

    /// One recovery cycle. Returns false when the retry budget is exhausted
    /// and the supervisor should give up.
    async fn recover(&self) -> bool {
        let outcome = retry_with_predicate(
            self.policy.clone(),
            || async {
                let channel = self.connection.reconnect().await?;
                topology::declare_all(&channel, &self.exchange, &self.queues).await?;
                Ok::<(), EventBusError>(())
            },
            // Topology mismatches are deployment errors; retrying cannot fix
            // them.
            |err| !matches!(err, EventBusError::Topology { .. }),
        )
        .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    queues = self.queues.len(),
                    "Reconnected, topology redeclared"
                );
                if self.resubscribe.send(()).is_err() {
                    tracing::debug!("No resubscribe listeners");
                }
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "Recovery failed, supervisor giving up");
                false
            }
        }
    }
}

/// Handle to a spawned supervisor.
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "Supervisor task failed during shutdown");
        }
    }

    /// True once the supervision loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
