//! Generic CRUD store over one entity collection.
//!
//! The in-memory list is what callers read. Every mutation takes the
//! collection's write guard, applies the change in memory, persists the whole
//! snapshot, notifies, and mirrors the change through the [`Database`], all
//! under the same guard so writes land in issue order.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;
use tokio::sync::OwnedMutexGuard;

use crm_core::{fold_for_search, next_id, DomainError, Entity, EntityId, Lifecycle};

use crate::clock::Clock;
use crate::database::{Database, MirrorOutcome};
use crate::error::OperationResult;
use crate::gateway::MutationOp;
use crate::local::{keys, LocalStore};
use crate::messages;
use crate::notify::{Notification, Notifier};

pub struct EntityStore<E: Entity> {
    items: RwLock<Vec<E>>,
    local: LocalStore,
    database: Arc<Database>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    seed_demo: bool,
}

impl<E: Entity> core::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityStore")
            .field("kind", &E::KIND)
            .field("len", &self.read_items().len())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(database: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            local: database.local().clone(),
            notifier: database.notifier().clone(),
            seed_demo: database.config().seed_demo,
            database,
            clock,
        }
    }

    fn key() -> &'static str {
        E::KIND.collection_key()
    }

    /// The guard every mutation of this collection runs under.
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<()> {
        self.local.lock(Self::key()).await
    }

    fn read_items(&self) -> RwLockReadGuard<'_, Vec<E>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_items(&self) -> RwLockWriteGuard<'_, Vec<E>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the persisted collection, seeding it if it was never written.
    ///
    /// Derived fields are recomputed so stale persisted values are never
    /// served.
    pub async fn load(&self) -> Vec<E> {
        let key = Self::key();
        let _guard = self.local.lock(key).await;

        let mut items = match self.local.read_records::<E>(key, E::upgrade_legacy).await {
            Some(items) => items,
            None => {
                let seed = if self.seed_demo {
                    E::seed(self.clock.now())
                } else {
                    Vec::new()
                };
                if let Err(err) = self.local.write(key, &seed).await {
                    tracing::warn!("failed to write initial '{key}' collection: {err}");
                }
                seed
            }
        };
        for item in &mut items {
            item.recompute();
        }

        tracing::debug!("loaded {} record(s) from '{key}'", items.len());
        *self.write_items() = items.clone();
        items
    }

    /// Create a record from `draft`: assign the next ID, stamp, derive, prepend.
    pub async fn create(&self, draft: E::Draft) -> OperationResult<E> {
        let _guard = self.lock().await;
        self.create_locked(draft).await
    }

    /// [`Self::create`] for a caller already holding [`Self::lock`].
    pub(crate) async fn create_locked(&self, draft: E::Draft) -> OperationResult<E> {
        let id = self.allocate_id().await;
        let mut entity = E::from_draft(id, draft, self.clock.now());
        entity.recompute();

        let snapshot = {
            let mut items = self.write_items();
            items.insert(0, entity.clone());
            items.clone()
        };
        if let Err(err) = self.persist(&snapshot).await {
            return OperationResult::partial(entity, err);
        }

        self.notify(messages::created(E::KIND, &entity.label())).await;
        self.mirror(MutationOp::Create, &entity).await;
        OperationResult::ok(entity)
    }

    /// Next ID above both the existing records and the persisted high-water
    /// mark. Caller holds the collection guard.
    async fn allocate_id(&self) -> EntityId {
        let key = Self::key();
        let _seq_guard = self.local.lock(keys::SEQUENCES).await;
        let mut sequences: BTreeMap<String, u64> = self
            .local
            .read_object(keys::SEQUENCES)
            .await
            .unwrap_or_default();
        let high_water = sequences.get(key).copied().unwrap_or(0);

        let (id, counter) = {
            let items = self.read_items();
            next_id(E::KIND.id_prefix(), items.iter().map(Entity::id), high_water)
        };

        sequences.insert(key.to_string(), counter);
        if let Err(err) = self.local.write_object(keys::SEQUENCES, &sequences).await {
            tracing::warn!("failed to persist ID sequence for '{key}': {err}");
        }
        id
    }

    /// Merge `patch` into record `id`.
    pub async fn update(&self, id: &str, patch: E::Patch) -> OperationResult<E> {
        let _guard = self.lock().await;
        self.update_locked(id, patch).await
    }

    /// [`Self::update`] for a caller already holding [`Self::lock`].
    pub(crate) async fn update_locked(&self, id: &str, patch: E::Patch) -> OperationResult<E> {
        self.apply_update(id, patch, |entity| {
            messages::updated(E::KIND, &entity.label())
        })
        .await
    }

    /// Change only the status of record `id`.
    pub async fn update_status(&self, id: &str, status: E::Status) -> OperationResult<E> {
        let _guard = self.lock().await;
        self.apply_update(id, E::status_patch(status), |entity| {
            messages::status_changed(E::KIND, &entity.label(), entity.status().label())
        })
        .await
    }

    /// Derive a patch from the current version of record `id` and apply it,
    /// with no other write to the collection in between. `derive` refuses
    /// the change by returning an error.
    pub async fn modify(
        &self,
        id: &str,
        derive: impl FnOnce(&E) -> Result<E::Patch, DomainError>,
    ) -> OperationResult<E> {
        let _guard = self.lock().await;
        let Some(current) = self.get_by_id(id) else {
            return self.not_found(id).await;
        };
        match derive(&current) {
            Ok(patch) => self.update_locked(id, patch).await,
            Err(err) => {
                tracing::warn!("change of {id} refused: {err}");
                self.notify(messages::operation_refused(&err.to_string())).await;
                OperationResult::err(err)
            }
        }
    }

    /// Caller holds [`Self::lock`].
    async fn apply_update(
        &self,
        id: &str,
        patch: E::Patch,
        notice: impl FnOnce(&E) -> Notification,
    ) -> OperationResult<E> {
        let Some(mut entity) = self.get_by_id(id) else {
            return self.not_found(id).await;
        };

        if let Some(next) = E::patch_status(&patch) {
            let current = entity.status();
            if let Err(err) = current.ensure_transition(next) {
                tracing::warn!("rejected status change of {id}: {err}");
                self.notify(messages::invalid_transition(
                    E::KIND,
                    &entity.label(),
                    current.label(),
                    next.label(),
                ))
                .await;
                return OperationResult::err(err);
            }
        }

        entity.apply_patch(patch);
        entity.recompute();
        entity.timestamps_mut().touch(self.clock.now());

        let snapshot = {
            let mut items = self.write_items();
            if let Some(slot) = items.iter_mut().find(|item| item.id().as_str() == id) {
                *slot = entity.clone();
            }
            items.clone()
        };
        if let Err(err) = self.persist(&snapshot).await {
            return OperationResult::partial(entity, err);
        }

        self.notify(notice(&entity)).await;
        self.mirror(MutationOp::Update, &entity).await;
        OperationResult::ok(entity)
    }

    /// Remove record `id`; the returned data is the removed record.
    pub async fn delete(&self, id: &str) -> OperationResult<E> {
        let _guard = self.lock().await;

        let removed = {
            let mut items = self.write_items();
            items
                .iter()
                .position(|item| item.id().as_str() == id)
                .map(|index| {
                    let removed = items.remove(index);
                    (removed, items.clone())
                })
        };
        let Some((removed, snapshot)) = removed else {
            return self.not_found(id).await;
        };
        let label = removed.label();

        if let Err(err) = self.persist(&snapshot).await {
            return OperationResult::partial(removed, err);
        }

        self.notify(messages::deleted(E::KIND, &label)).await;
        self.mirror(MutationOp::Delete, &removed).await;
        OperationResult::ok(removed)
    }

    async fn persist(&self, snapshot: &[E]) -> Result<(), String> {
        match self.local.write(Self::key(), snapshot).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!("failed to persist '{}': {err}", Self::key());
                let detail = err.to_string();
                self.notify(messages::save_failed(&detail)).await;
                Err(detail)
            }
        }
    }

    pub(crate) async fn not_found(&self, id: &str) -> OperationResult<E> {
        tracing::warn!("{} {id} not found", E::KIND.name());
        self.notify(messages::not_found(E::KIND, id)).await;
        OperationResult::err(DomainError::not_found(format!("{} {id}", E::KIND.name())))
    }

    /// Swap the in-memory version of a record without persisting it.
    pub(crate) fn replace_cached(&self, entity: E) {
        let mut items = self.write_items();
        if let Some(slot) = items
            .iter_mut()
            .find(|item| item.id().as_str() == entity.id().as_str())
        {
            *slot = entity;
        }
    }

    /// Put `previous` back, persist and mirror it; undoes one side of a
    /// change spanning two collections. Caller holds [`Self::lock`].
    pub(crate) async fn restore_locked(&self, previous: E) {
        self.replace_cached(previous.clone());
        let snapshot = self.list();
        if let Err(err) = self.local.write(Self::key(), &snapshot).await {
            tracing::error!("failed to restore {}: {err}", previous.id());
            return;
        }
        tracing::info!("restored {} after a failed linked change", previous.id());
        self.mirror(MutationOp::Update, &previous).await;
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    async fn notify(&self, notification: Notification) {
        self.notifier.notify(notification).await;
    }

    async fn mirror(&self, op: MutationOp, entity: &E) -> MirrorOutcome {
        let payload = match op {
            MutationOp::Delete => json!({ "id": entity.id() }),
            MutationOp::Create | MutationOp::Update => match serde_json::to_value(entity) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!("failed to serialize {} for sync: {err}", entity.id());
                    return MirrorOutcome::Skipped;
                }
            },
        };
        let outcome = self.database.mirror(E::KIND, op, &payload).await;
        tracing::debug!("{op} {} mirrored: {outcome:?}", entity.id());
        outcome
    }

    /// Records, newest first.
    pub fn list(&self) -> Vec<E> {
        self.read_items().clone()
    }

    pub fn count(&self) -> usize {
        self.read_items().len()
    }

    pub fn get_by_id(&self, id: &str) -> Option<E> {
        self.read_items()
            .iter()
            .find(|item| item.id().as_str() == id)
            .cloned()
    }

    pub fn filter(&self, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        self.read_items()
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    pub fn by_status(&self, status: E::Status) -> Vec<E> {
        self.filter(|item| item.status() == status)
    }

    /// Substring match on the client name, ignoring case and accents.
    pub fn by_client(&self, client: &str) -> Vec<E> {
        let needle = fold_for_search(client.trim());
        self.filter(|item| {
            item.client_name()
                .is_some_and(|name| fold_for_search(name).contains(&needle))
        })
    }

    /// Free-text search; an empty query returns everything.
    pub fn search(&self, query: &str) -> Vec<E> {
        self.filter(|item| item.matches(query))
    }
}
