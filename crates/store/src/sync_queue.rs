//! Persisted FIFO of mutations awaiting delivery to the remote API.
//!
//! Entries live as a JSON array under `crm_sync_queue`. Replay drains pending
//! entries strictly in enqueue order: a transient failure stops the drain so
//! a later mutation never overtakes an earlier one.

use core::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::LocalStoreError;
use crate::gateway::{push_mutation, Endpoint, MutationOp, RemoteApi};
use crate::local::{keys, LocalStore};

/// `<op>_<entity>` tag of a queued mutation, e.g. `update_invoices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub op: MutationOp,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionKeyError {
    #[error("malformed action key '{0}'")]
    Malformed(String),

    #[error("unknown operation '{op}' in action key '{key}'")]
    UnknownOp { key: String, op: String },

    #[error("unknown entity '{entity}' in action key '{key}'")]
    UnknownEntity { key: String, entity: String },
}

impl ActionKey {
    pub fn new(op: MutationOp, endpoint: Endpoint) -> Self {
        Self { op, endpoint }
    }

    /// Split on the first `_` and validate both halves.
    pub fn parse(raw: &str) -> Result<Self, ActionKeyError> {
        let (op, entity) = raw
            .split_once('_')
            .filter(|(op, entity)| !op.is_empty() && !entity.is_empty())
            .ok_or_else(|| ActionKeyError::Malformed(raw.to_string()))?;

        let op = MutationOp::from_str(op).map_err(|_| ActionKeyError::UnknownOp {
            key: raw.to_string(),
            op: op.to_string(),
        })?;
        let endpoint = Endpoint::from_str(entity).map_err(|_| ActionKeyError::UnknownEntity {
            key: raw.to_string(),
            entity: entity.to_string(),
        })?;
        Ok(Self { op, endpoint })
    }
}

impl core::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}_{}", self.op, self.endpoint)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Pending,
    /// Dead-lettered: skipped by replay until retried or discarded.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: Uuid,
    pub action_key: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedMutation {
    pub fn action(&self) -> Result<ActionKey, ActionKeyError> {
        ActionKey::parse(&self.action_key)
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }
}

/// Exponential backoff between replay attempts of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before an entry is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempts`-th failure: `base * 2^(attempts - 1)`, capped.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries delivered and removed.
    pub replayed: usize,
    /// Corrupt entries removed without being sent.
    pub dropped: usize,
    /// Entries moved to the failed state during this pass.
    pub dead_lettered: usize,
    /// Pending entries left after the pass.
    pub remaining: usize,
    /// The drain stopped early (transient failure or backoff window).
    pub halted: bool,
    /// The drain stopped because the remote API could not be reached.
    pub unreachable: bool,
    /// Another replay was already running; nothing was done.
    pub skipped: bool,
}

enum Delivery {
    Delivered,
    Retry,
    Unreachable,
    DeadLettered,
}

/// The sync queue. Cheap to clone; clones share the replay guard.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    local: LocalStore,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    replaying: Arc<tokio::sync::Mutex<()>>,
}

impl SyncQueue {
    pub fn new(local: LocalStore, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            local,
            clock,
            policy,
            replaying: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Entries as persisted, and how many raw entries could not be parsed.
    async fn load(&self) -> (Vec<QueuedMutation>, usize) {
        let values = self
            .local
            .read_values(keys::SYNC_QUEUE)
            .await
            .unwrap_or_default();
        let total = values.len();
        let entries: Vec<QueuedMutation> = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("dropping corrupt sync queue entry: {err}");
                    None
                }
            })
            .collect();
        let corrupt = total - entries.len();
        (entries, corrupt)
    }

    async fn store(&self, entries: &[QueuedMutation]) -> Result<(), LocalStoreError> {
        self.local.write(keys::SYNC_QUEUE, entries).await
    }

    /// Append a mutation to the tail of the queue.
    pub async fn enqueue(&self, action: ActionKey, payload: Value) -> Result<QueuedMutation, LocalStoreError> {
        let entry = QueuedMutation {
            id: Uuid::now_v7(),
            action_key: action.to_string(),
            payload,
            enqueued_at: self.clock.now(),
            attempts: 0,
            next_attempt_at: None,
            status: EntryStatus::Pending,
            last_error: None,
        };

        let value = serde_json::to_value(&entry).map_err(|source| LocalStoreError::Serialization {
            key: keys::SYNC_QUEUE.to_string(),
            source,
        })?;

        // Append to the raw array; corrupt entries are left for replay to count.
        let _guard = self.local.lock(keys::SYNC_QUEUE).await;
        let mut raw = self
            .local
            .read_values(keys::SYNC_QUEUE)
            .await
            .unwrap_or_default();
        raw.push(value);
        self.local.write(keys::SYNC_QUEUE, &raw).await?;
        tracing::debug!("queued {} ({} in queue)", entry.action_key, raw.len());
        Ok(entry)
    }

    pub async fn entries(&self) -> Vec<QueuedMutation> {
        self.load().await.0
    }

    pub async fn pending(&self) -> Vec<QueuedMutation> {
        let mut entries = self.entries().await;
        entries.retain(QueuedMutation::is_pending);
        entries
    }

    pub async fn pending_count(&self) -> usize {
        self.pending().await.len()
    }

    /// Whether a pending mutation targets `endpoint`.
    pub async fn has_pending_for(&self, endpoint: Endpoint) -> bool {
        self.pending()
            .await
            .iter()
            .any(|entry| entry.action().is_ok_and(|action| action.endpoint == endpoint))
    }

    pub async fn list_failed(&self) -> Vec<QueuedMutation> {
        let mut entries = self.entries().await;
        entries.retain(|entry| entry.status == EntryStatus::Failed);
        entries
    }

    /// Put a dead-lettered entry back in line with its attempts reset.
    ///
    /// The entry keeps its original position. Returns `false` if no failed
    /// entry has this ID.
    pub async fn retry_failed(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        let _guard = self.local.lock(keys::SYNC_QUEUE).await;
        let (mut entries, _) = self.load().await;
        let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.status == EntryStatus::Failed)
        else {
            return Ok(false);
        };
        entry.status = EntryStatus::Pending;
        entry.attempts = 0;
        entry.next_attempt_at = None;
        entry.last_error = None;
        self.store(&entries).await?;
        Ok(true)
    }

    pub async fn discard_failed(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        let _guard = self.local.lock(keys::SYNC_QUEUE).await;
        let (mut entries, _) = self.load().await;
        let before = entries.len();
        entries.retain(|entry| !(entry.id == id && entry.status == EntryStatus::Failed));
        if entries.len() == before {
            return Ok(false);
        }
        self.store(&entries).await?;
        Ok(true)
    }

    /// When the queue was last fully drained.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.local.read_object(keys::LAST_SYNC).await
    }

    /// Remove corrupt entries and return the first pending one.
    async fn next_pending(&self, report: &mut ReplayReport) -> Result<Option<(QueuedMutation, ActionKey)>, LocalStoreError> {
        let _guard = self.local.lock(keys::SYNC_QUEUE).await;
        let (mut entries, corrupt) = self.load().await;

        let before = entries.len();
        entries.retain(|entry| match entry.action() {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("dropping sync queue entry {}: {err}", entry.id);
                false
            }
        });
        let dropped = corrupt + (before - entries.len());
        if dropped > 0 {
            report.dropped += dropped;
            self.store(&entries).await?;
        }

        Ok(entries
            .into_iter()
            .find(QueuedMutation::is_pending)
            .and_then(|entry| entry.action().ok().map(|action| (entry, action))))
    }

    /// Record the outcome of one delivery attempt.
    async fn settle(
        &self,
        id: Uuid,
        result: Result<(), crate::gateway::GatewayError>,
        now: DateTime<Utc>,
    ) -> Result<Delivery, LocalStoreError> {
        let _guard = self.local.lock(keys::SYNC_QUEUE).await;
        let (mut entries, _) = self.load().await;

        let delivery = match result {
            Ok(()) => {
                entries.retain(|entry| entry.id != id);
                Delivery::Delivered
            }
            Err(err) => {
                let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
                    // Discarded while in flight.
                    return Ok(Delivery::DeadLettered);
                };
                entry.last_error = Some(err.to_string());

                // Outages spend no attempt; the entry goes out once the API is back.
                if err.is_connectivity() {
                    tracing::warn!("replay of {} could not reach the remote API: {err}", entry.action_key);
                    self.store(&entries).await?;
                    return Ok(Delivery::Unreachable);
                }

                entry.attempts += 1;
                if err.is_transient() && entry.attempts < self.policy.max_attempts {
                    let delay = self.policy.backoff(entry.attempts);
                    let wait = chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(300));
                    entry.next_attempt_at = Some(now + wait);
                    tracing::warn!(
                        "replay of {} failed (attempt {}), retrying in {delay:?}: {err}",
                        entry.action_key,
                        entry.attempts
                    );
                    Delivery::Retry
                } else {
                    entry.status = EntryStatus::Failed;
                    entry.next_attempt_at = None;
                    tracing::error!(
                        "dead-lettering {} after {} attempt(s): {err}",
                        entry.action_key,
                        entry.attempts
                    );
                    Delivery::DeadLettered
                }
            }
        };

        self.store(&entries).await?;
        Ok(delivery)
    }

    /// Drain pending entries in order through `remote`.
    ///
    /// Only one replay runs at a time; a concurrent call returns immediately
    /// with `skipped` set.
    pub async fn replay(&self, remote: &dyn RemoteApi) -> ReplayReport {
        let Ok(_running) = self.replaying.try_lock() else {
            tracing::debug!("sync queue replay already running");
            return ReplayReport {
                skipped: true,
                ..ReplayReport::default()
            };
        };

        let mut report = ReplayReport::default();
        loop {
            let (entry, action) = match self.next_pending(&mut report).await {
                Ok(Some(head)) => head,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("failed to rewrite sync queue, stopping replay: {err}");
                    report.halted = true;
                    break;
                }
            };

            let now = self.clock.now();
            if entry.next_attempt_at.is_some_and(|at| at > now) {
                report.halted = true;
                break;
            }

            let result = push_mutation(remote, action.op, action.endpoint, &entry.payload)
                .await
                .map(|_| ());

            match self.settle(entry.id, result, now).await {
                Ok(Delivery::Delivered) => report.replayed += 1,
                Ok(Delivery::DeadLettered) => report.dead_lettered += 1,
                Ok(Delivery::Retry) => {
                    report.halted = true;
                    break;
                }
                Ok(Delivery::Unreachable) => {
                    report.halted = true;
                    report.unreachable = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!("failed to persist replay outcome of {}, stopping: {err}", entry.action_key);
                    report.halted = true;
                    break;
                }
            }
        }

        report.remaining = self.pending_count().await;
        if report.remaining == 0 {
            if let Err(err) = self.local.write_object(keys::LAST_SYNC, &self.clock.now()).await {
                tracing::warn!("failed to stamp last sync: {err}");
            }
        }

        if report.replayed + report.dropped + report.dead_lettered > 0 {
            tracing::info!(
                "sync queue replay: {} replayed, {} dropped, {} dead-lettered, {} remaining",
                report.replayed,
                report.dropped,
                report.dead_lettered,
                report.remaining
            );
        }
        report
    }
}
