//! The database facade: remote API when reachable, local store otherwise.
//!
//! Every method is total: failures are logged and reported through
//! [`OperationResult`], a `bool` or a [`MirrorOutcome`], never propagated.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};

use crm_core::{fold_for_search, EntityKind};

use crate::config::StoreConfig;
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::{LocalStoreError, OperationResult};
use crate::gateway::{push_mutation, Endpoint, GatewayError, ListParams, MutationOp, PagedList, RemoteApi};
use crate::local::LocalStore;
use crate::messages;
use crate::notify::Notifier;
use crate::sync_queue::{ActionKey, ReplayReport, SyncQueue};

/// What happened to a mirrored mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Accepted by the remote API.
    Pushed,
    /// Stored in the sync queue for later replay.
    Queued,
    /// Remote disabled or facade disposed; nothing to do.
    Skipped,
    /// The remote API refused it permanently.
    Rejected,
}

pub struct Database {
    config: StoreConfig,
    local: LocalStore,
    remote: Option<Arc<dyn RemoteApi>>,
    monitor: Arc<ConnectivityMonitor>,
    queue: SyncQueue,
    notifier: Arc<dyn Notifier>,
    init_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl core::fmt::Debug for Database {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Database")
            .field("api_url", &self.config.api_url)
            .field("remote", &self.remote.is_some())
            .field("state", &self.monitor.state())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(
        config: StoreConfig,
        local: LocalStore,
        remote: Option<Arc<dyn RemoteApi>>,
        monitor: Arc<ConnectivityMonitor>,
        queue: SyncQueue,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            local,
            remote,
            monitor,
            queue,
            notifier,
            init_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// The remote API, unless disabled by configuration or disposed.
    fn remote(&self) -> Option<&dyn RemoteApi> {
        if !self.config.remote_enabled || self.disposed.load(Ordering::SeqCst) {
            return None;
        }
        self.remote.as_deref()
    }

    /// The remote API if it is also believed reachable.
    fn available_remote(&self) -> Option<&dyn RemoteApi> {
        self.remote().filter(|_| self.monitor.is_online())
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.remote().is_some()
    }

    pub fn is_remote_available(&self) -> bool {
        self.available_remote().is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Probe the remote API once and settle the connectivity state.
    ///
    /// Idempotent; later calls return the current availability.
    pub async fn init(&self) -> bool {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            return self.is_remote_available();
        }

        if self.remote().is_none() {
            self.monitor.set_online(false);
            tracing::info!("remote API disabled, running local-only");
        } else {
            let online = self.probe().await;
            // Startup state is not announced, but a persisted backlog is replayed.
            self.monitor.set_online(online);
            if online {
                tracing::info!("remote API reachable at {}", self.config.api_url);
                if self.queue.pending_count().await > 0 {
                    self.replay_queue().await;
                }
            } else {
                tracing::warn!(
                    "remote API unreachable at {}, using local fallback",
                    self.config.api_url
                );
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        self.is_remote_available()
    }

    async fn probe(&self) -> bool {
        let Some(remote) = self.remote() else {
            return false;
        };
        match tokio::time::timeout(self.config.request_timeout, remote.health()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::debug!("health probe failed: {err}");
                false
            }
            Err(_) => {
                tracing::debug!("health probe timed out after {:?}", self.config.request_timeout);
                false
            }
        }
    }

    /// Re-check the remote API and apply the result.
    pub async fn reprobe(&self) -> bool {
        if self.remote().is_none() {
            return false;
        }
        let online = self.probe().await;
        self.set_online(online).await;
        online
    }

    /// Apply a connectivity signal.
    ///
    /// Coming back online replays the queue once and produces exactly one
    /// notification, unless the replay finds the API gone again. Going
    /// offline only flips the state.
    pub async fn set_online(&self, online: bool) -> Option<Transition> {
        let transition = self.monitor.set_online(online);
        match transition {
            Some(Transition::CameOnline) => {
                let report = self.replay_silently().await;
                if report.unreachable {
                    return transition;
                }
                let notification = if report.replayed + report.dead_lettered > 0 {
                    messages::sync_summary(&report)
                } else {
                    messages::back_online(report.remaining)
                };
                self.notifier.notify(notification).await;
            }
            Some(Transition::WentOffline) => {
                tracing::warn!("remote API unreachable, changes are queued locally");
            }
            None => {}
        }
        transition
    }

    /// Flip to offline after a call could not reach the remote API, so the
    /// worker goes back to probing and replays once it answers.
    fn lost_contact(&self, reason: &dyn core::fmt::Display) {
        if self.monitor.set_online(false).is_some() {
            tracing::warn!("remote API unreachable ({reason}), changes are queued locally");
        }
    }

    fn check_contact(&self, err: &GatewayError) {
        if err.is_connectivity() {
            self.lost_contact(err);
        }
    }

    async fn replay_silently(&self) -> ReplayReport {
        match self.available_remote() {
            Some(remote) => {
                let report = self.queue.replay(remote).await;
                if report.unreachable {
                    self.lost_contact(&"sync queue replay");
                }
                report
            }
            None => ReplayReport {
                remaining: self.queue.pending_count().await,
                halted: true,
                ..ReplayReport::default()
            },
        }
    }

    /// Drain the sync queue if the remote API is available.
    pub async fn replay_queue(&self) -> ReplayReport {
        let report = self.replay_silently().await;
        if report.replayed + report.dead_lettered > 0 {
            self.notifier.notify(messages::sync_summary(&report)).await;
        }
        report
    }

    /// Propagate a local mutation of an entity collection.
    pub async fn mirror(&self, kind: EntityKind, op: MutationOp, data: &Value) -> MirrorOutcome {
        self.mirror_value(Endpoint::for_kind(kind), op, data).await
    }

    /// Propagate a local mutation to `endpoint`: push now when online and
    /// nothing older is waiting, queue otherwise.
    pub async fn mirror_value(&self, endpoint: Endpoint, op: MutationOp, data: &Value) -> MirrorOutcome {
        let Some(remote) = self.remote() else {
            return MirrorOutcome::Skipped;
        };
        let action = ActionKey::new(op, endpoint);

        if !self.monitor.is_online() || self.queue.pending_count().await > 0 {
            return self.enqueue(action, data).await;
        }

        match push_mutation(remote, op, endpoint, data).await {
            Ok(_) => MirrorOutcome::Pushed,
            Err(err) if err.is_transient() => {
                tracing::warn!("{action} failed transiently, queueing: {err}");
                self.check_contact(&err);
                self.enqueue(action, data).await
            }
            Err(err) => {
                tracing::warn!("{action} rejected by remote API: {err}");
                MirrorOutcome::Rejected
            }
        }
    }

    async fn enqueue(&self, action: ActionKey, data: &Value) -> MirrorOutcome {
        match self.queue.enqueue(action, data.clone()).await {
            Ok(_) => MirrorOutcome::Queued,
            Err(err) => {
                tracing::error!("failed to queue {action}: {err}");
                MirrorOutcome::Skipped
            }
        }
    }

    /// List records, remote first, falling back to the local collection.
    pub async fn fetch_data(&self, kind: EntityKind, params: &ListParams) -> OperationResult<PagedList<Value>> {
        if let Some(remote) = self.available_remote() {
            match remote.list(Endpoint::for_kind(kind), params).await {
                Ok(page) => return OperationResult::ok(page),
                Err(err) => {
                    tracing::warn!("fetching {} remotely failed, using local data: {err}", kind.name());
                    self.check_contact(&err);
                }
            }
        }

        let items: Vec<Value> = self
            .local
            .read_values(kind.collection_key())
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|item| matches_params(item, params))
            .collect();
        OperationResult::ok(PagedList::paginate(items, params))
    }

    /// Load a whole collection; remote data refreshes the local cache unless
    /// local mutations of that collection are still waiting to be synced.
    pub async fn load_data(&self, kind: EntityKind) -> OperationResult<Vec<Value>> {
        let endpoint = Endpoint::for_kind(kind);
        if let Some(remote) = self.available_remote() {
            match remote.list(endpoint, &ListParams::default()).await {
                Ok(page) => {
                    if !self.queue.has_pending_for(endpoint).await {
                        let _guard = self.local.lock(kind.collection_key()).await;
                        if let Err(err) = self.local.write(kind.collection_key(), &page.data).await {
                            tracing::warn!("failed to cache {} locally: {err}", kind.name());
                        }
                    }
                    return OperationResult::ok(page.data);
                }
                Err(err) => {
                    tracing::warn!("loading {} remotely failed, using local data: {err}", kind.name());
                    self.check_contact(&err);
                }
            }
        }

        OperationResult::ok(
            self.local
                .read_values(kind.collection_key())
                .await
                .unwrap_or_default(),
        )
    }

    /// Apply a mutation remotely, or locally plus queued when the remote API
    /// is unavailable.
    pub async fn sync_data(&self, kind: EntityKind, op: MutationOp, data: Value) -> bool {
        let endpoint = Endpoint::for_kind(kind);
        if let Some(remote) = self.available_remote() {
            if self.queue.pending_count().await == 0 {
                match push_mutation(remote, op, endpoint, &data).await {
                    Ok(_) => return true,
                    Err(err) if !err.is_transient() => {
                        tracing::warn!("{op} on {} rejected: {err}", kind.name());
                        return false;
                    }
                    Err(err) => {
                        tracing::warn!("{op} on {} failed, falling back to local: {err}", kind.name());
                        self.check_contact(&err);
                    }
                }
            }
        }

        if let Err(err) = self.apply_local(kind, op, &data).await {
            tracing::error!("local fallback for {op} on {} failed: {err}", kind.name());
            return false;
        }
        if self.remote().is_some() {
            if let Err(err) = self.queue.enqueue(ActionKey::new(op, endpoint), data).await {
                tracing::error!("failed to queue {op} on {}: {err}", kind.name());
                return false;
            }
        }
        true
    }

    async fn apply_local(&self, kind: EntityKind, op: MutationOp, data: &Value) -> Result<(), LocalStoreError> {
        let key = kind.collection_key();
        let _guard = self.local.lock(key).await;
        let mut items = self.local.read_values(key).await.unwrap_or_default();
        let id = data.get("id").and_then(Value::as_str);
        let position = |items: &[Value]| {
            id.and_then(|id| items.iter().position(|item| item.get("id").and_then(Value::as_str) == Some(id)))
        };

        match op {
            MutationOp::Create => items.insert(0, data.clone()),
            MutationOp::Update => match (position(&items), data.as_object()) {
                (Some(index), Some(patch)) => merge_into(&mut items[index], patch),
                _ => tracing::warn!("update of unknown {} record {id:?}, ignored locally", kind.name()),
            },
            MutationOp::Delete => {
                if let Some(index) = position(&items) {
                    items.remove(index);
                }
            }
        }
        self.local.write(key, &items).await
    }

    /// Stop all remote traffic. Local reads and writes keep working.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            tracing::info!("database facade disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

fn merge_into(target: &mut Value, patch: &Map<String, Value>) {
    if let Some(object) = target.as_object_mut() {
        for (key, value) in patch {
            object.insert(key.clone(), value.clone());
        }
    }
}

fn matches_params(item: &Value, params: &ListParams) -> bool {
    if let Some(status) = params.status.as_deref() {
        if item.get("status").and_then(Value::as_str) != Some(status) {
            return false;
        }
    }
    match params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => true,
        Some(query) => {
            let needle = fold_for_search(query);
            item.as_object().is_some_and(|object| {
                object
                    .values()
                    .filter_map(Value::as_str)
                    .any(|field| fold_for_search(field).contains(&needle))
            })
        }
    }
}
