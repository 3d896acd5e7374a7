//! Background worker keeping the sync queue drained.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::database::Database;

/// Periodically replays the queue while online and re-probes the remote API
/// while offline.
pub struct SyncWorker {
    database: Arc<Database>,
    tick: Duration,
    shutdown: Arc<Notify>,
}

/// Handle of a running [`SyncWorker`].
pub struct SyncWorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SyncWorkerHandle {
    /// Signal the worker and wait for it to stop.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            tracing::warn!("sync worker terminated abnormally: {err}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl SyncWorker {
    pub fn new(database: Arc<Database>, tick: Duration) -> Self {
        Self {
            database,
            tick,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawn the worker on the current tokio runtime.
    pub fn start(self) -> SyncWorkerHandle {
        let shutdown = self.shutdown.clone();
        let join = tokio::spawn(self.run());
        SyncWorkerHandle { shutdown, join }
    }

    async fn run(self) {
        let database = self.database;
        let reprobe_interval = database.config().reprobe_interval;
        tracing::info!("sync worker started (tick {:?}, reprobe {:?})", self.tick, reprobe_interval);

        let mut connectivity = database.monitor().subscribe();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_probe = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("sync worker received shutdown signal");
                    break;
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Whoever flipped the state already probed.
                    if !connectivity.borrow_and_update().is_online() {
                        last_probe = Instant::now();
                    }
                }
                _ = interval.tick() => {
                    if database.is_disposed() {
                        tracing::debug!("database disposed, stopping sync worker");
                        break;
                    }

                    if database.is_remote_available() {
                        if database.queue().pending_count().await > 0 {
                            database.replay_queue().await;
                        }
                    } else if database.is_remote_enabled() && last_probe.elapsed() >= reprobe_interval {
                        last_probe = Instant::now();
                        tracing::debug!("re-probing remote API");
                        database.reprobe().await;
                    }
                }
            }
        }

        tracing::info!("sync worker stopped");
    }
}
