//! `crm-store`
//!
//! **Responsibility:** offline-first persistence and sync for CRM records.
//!
//! This crate provides:
//! - a local key-value persistence adapter (in-memory or SQLite)
//! - a remote API gateway over HTTP
//! - connectivity tracking and a persisted, ordered sync queue
//! - one generic entity store per business record type
//! - the `Database` facade choosing remote or local per call
//!
//! Local storage is the source of truth for the UI; the remote API is mirrored
//! best-effort and caught up by queue replay on reconnect.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod crm;
pub mod database;
pub mod entity_store;
pub mod error;
pub mod gateway;
pub mod local;
pub mod messages;
pub mod notify;
pub mod settings;
pub mod sqlite;
pub mod stores;
pub mod sync_queue;
pub mod sync_worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityState, Transition};
pub use crm::{Crm, CrmBuilder, CrmSummary};
pub use database::{Database, MirrorOutcome};
pub use entity_store::EntityStore;
pub use error::{LocalStoreError, OperationResult};
pub use gateway::{
    ApiGateway, Endpoint, GatewayError, ListParams, MutationOp, PagedList, RemoteApi,
};
pub use local::{KeyValueStore, LocalStore, MemoryKeyValueStore};
pub use notify::{
    Notification, NotificationLevel, Notifier, PersistentNotifier, RecordingNotifier,
    TracingNotifier,
};
pub use settings::{CompanySettings, IntegrationConfig, SettingsStore, WhatsAppConfig};
pub use sqlite::SqliteKeyValueStore;
pub use sync_queue::{ActionKey, EntryStatus, QueuedMutation, ReplayReport, RetryPolicy, SyncQueue};
pub use sync_worker::{SyncWorker, SyncWorkerHandle};
