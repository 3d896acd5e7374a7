#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crm_invoicing::{InvoiceDraft, InvoiceStatus};
use crm_planning::{TaskDraft, TaskPriority, TaskStatus};
use crm_store::{
    Clock, Crm, Endpoint, GatewayError, KeyValueStore, ListParams, LocalStoreError, ManualClock,
    MemoryKeyValueStore, Notifier, PagedList, RecordingNotifier, RemoteApi, StoreConfig,
};

/// In-process backend double: records every call, can be made unreachable and
/// can be told to fail the next mutations.
#[derive(Default)]
pub struct FakeRemote {
    healthy: AtomicBool,
    health_checks: AtomicUsize,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<GatewayError>>,
    collections: Mutex<HashMap<Endpoint, Vec<Value>>>,
}

impl FakeRemote {
    pub fn new(healthy: bool) -> Arc<Self> {
        let remote = Self::default();
        remote.healthy.store(healthy, Ordering::SeqCst);
        Arc::new(remote)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Queue an error returned by the next list or mutation call.
    pub fn fail_next(&self, err: GatewayError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// Calls as `"<op> <endpoint> <id>"`, in arrival order (health excluded).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Mutation calls only.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("list "))
            .collect()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn seed(&self, endpoint: Endpoint, items: Vec<Value>) {
        self.collections.lock().unwrap().insert(endpoint, items);
    }

    pub fn collection(&self, endpoint: Endpoint) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(call.trim_end().to_string());
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("connection refused".into()));
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn id_of(body: &Value) -> String {
    body.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn health(&self) -> Result<(), GatewayError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Network("connection refused".into()))
        }
    }

    async fn list(&self, endpoint: Endpoint, params: &ListParams) -> Result<PagedList<Value>, GatewayError> {
        self.record(format!("list {endpoint}"))?;
        Ok(PagedList::paginate(self.collection(endpoint), params))
    }

    async fn create(&self, endpoint: Endpoint, body: &Value) -> Result<Value, GatewayError> {
        self.record(format!("create {endpoint} {}", id_of(body)))?;
        self.collections
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .insert(0, body.clone());
        Ok(body.clone())
    }

    async fn update(&self, endpoint: Endpoint, id: &str, body: &Value) -> Result<Value, GatewayError> {
        self.record(format!("update {endpoint} {id}"))?;
        let mut collections = self.collections.lock().unwrap();
        let items = collections.entry(endpoint).or_default();
        match items.iter_mut().find(|item| id_of(item) == id) {
            Some(item) => *item = body.clone(),
            None => items.push(body.clone()),
        }
        Ok(body.clone())
    }

    async fn delete(&self, endpoint: Endpoint, id: &str) -> Result<(), GatewayError> {
        self.record(format!("delete {endpoint} {id}"))?;
        self.collections
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .retain(|item| id_of(item) != id);
        Ok(())
    }
}

/// Memory backend that yields to the scheduler on every call, so joined
/// futures interleave, and can be told to reject writes of one key.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    inner: MemoryKeyValueStore,
    rejected: Mutex<Option<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_writes_to(&self, key: &str) {
        *self.rejected.lock().unwrap() = Some(key.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.raw(key)
    }
}

#[async_trait]
impl KeyValueStore for ScriptedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError> {
        tokio::task::yield_now().await;
        if self.rejected.lock().unwrap().as_deref() == Some(key) {
            return Err(LocalStoreError::QuotaExceeded {
                key: key.to_string(),
                needed: key.len() + value.len(),
                available: 0,
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        tokio::task::yield_now().await;
        self.inner.remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        self.inner.keys().await
    }
}

/// Local-only CRM over `backend`, with recorded notifications.
pub fn crm_over(backend: Arc<ScriptedBackend>) -> (Crm, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let crm = Crm::builder(StoreConfig::local_only())
        .backend(backend as Arc<dyn KeyValueStore>)
        .notifier(notifier.clone() as Arc<dyn Notifier>)
        .clock(ticking_clock() as Arc<dyn Clock>)
        .build();
    (crm, notifier)
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A wired [`Crm`] plus handles on its in-memory parts.
pub struct Harness {
    pub crm: Crm,
    pub remote: Option<Arc<FakeRemote>>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryKeyValueStore>,
    pub config: StoreConfig,
}

impl Harness {
    /// Local-only CRM over an empty in-memory store.
    pub fn local_only() -> Self {
        Self::build(StoreConfig::local_only(), None, ticking_clock(), Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn with_remote(remote: Arc<FakeRemote>) -> Self {
        Self::with_remote_and_clock(remote, ticking_clock())
    }

    pub fn with_remote_and_clock(remote: Arc<FakeRemote>, clock: Arc<ManualClock>) -> Self {
        Self::build(StoreConfig::default(), Some(remote), clock, Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn build(
        config: StoreConfig,
        remote: Option<Arc<FakeRemote>>,
        clock: Arc<ManualClock>,
        backend: Arc<MemoryKeyValueStore>,
    ) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut builder = Crm::builder(config.clone())
            .backend(backend.clone())
            .notifier(notifier.clone() as Arc<dyn Notifier>)
            .clock(clock.clone() as Arc<dyn Clock>);
        if let Some(remote) = &remote {
            builder = builder.remote(remote.clone() as Arc<dyn RemoteApi>);
        }
        Self {
            crm: builder.build(),
            remote,
            notifier,
            clock,
            backend,
            config,
        }
    }

    /// A second CRM over the same storage, as after an application restart.
    pub fn restart(&self) -> Self {
        Self::build(
            self.config.clone(),
            self.remote.clone(),
            self.clock.clone(),
            self.backend.clone(),
        )
    }

    pub fn remote(&self) -> &FakeRemote {
        self.remote.as_deref().expect("harness has no remote")
    }

    pub fn titles(&self) -> Vec<String> {
        self.notifier
            .snapshot()
            .into_iter()
            .map(|notification| notification.title)
            .collect()
    }
}

pub fn ticking_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::ticking(start_time(), Duration::seconds(1)))
}

pub fn frozen_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn invoice_draft(client: &str, amount: f64, advance: f64) -> InvoiceDraft {
    InvoiceDraft {
        client: client.to_string(),
        client_email: None,
        issue_date: date(2024, 3, 1),
        due_date: date(2024, 3, 31),
        amount,
        advance_amount: advance,
        status: InvoiceStatus::Draft,
        payment_method: None,
        quote_id: None,
        bon_livraison_id: None,
        notes: None,
    }
}

pub fn task_draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: None,
        assignee: None,
        client: None,
        due_date: None,
        priority: TaskPriority::Moyenne,
        status: TaskStatus::Todo,
        related_id: None,
    }
}
