//! User-facing notifications ("toasts").

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::local::{keys, LocalStore};

/// Entries kept in the persisted notification history.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, description)
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, description)
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, description)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, description)
    }
}

/// Sink for notifications.
#[async_trait]
pub trait Notifier: Send + Sync + core::fmt::Debug {
    async fn notify(&self, notification: Notification);
}

/// Logs every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Error => tracing::error!(title = %n.title, "{}", n.description),
            NotificationLevel::Warning => tracing::warn!(title = %n.title, "{}", n.description),
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(title = %n.title, "{}", n.description)
            }
        }
    }
}

/// Keeps every notification in memory, for tests and embedding UIs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.seen().clone()
    }

    pub fn count(&self) -> usize {
        self.seen().len()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen().last().cloned()
    }

    /// Drain what was recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen())
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.seen().push(notification);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNotification {
    #[serde(flatten)]
    notification: Notification,
    at: DateTime<Utc>,
}

/// Forwards to an inner notifier and appends to the bounded history under
/// `crm_notifications`.
#[derive(Debug)]
pub struct PersistentNotifier {
    inner: Arc<dyn Notifier>,
    local: LocalStore,
    clock: Arc<dyn Clock>,
}

impl PersistentNotifier {
    pub fn new(inner: Arc<dyn Notifier>, local: LocalStore, clock: Arc<dyn Clock>) -> Self {
        Self { inner, local, clock }
    }

    /// Persisted history, oldest first.
    pub async fn history(&self) -> Vec<Notification> {
        self.local
            .read::<StoredNotification>(keys::NOTIFICATIONS)
            .await
            .into_iter()
            .map(|stored| stored.notification)
            .collect()
    }
}

#[async_trait]
impl Notifier for PersistentNotifier {
    async fn notify(&self, notification: Notification) {
        {
            let _guard = self.local.lock(keys::NOTIFICATIONS).await;
            let mut history: Vec<StoredNotification> = self.local.read(keys::NOTIFICATIONS).await;
            history.push(StoredNotification {
                notification: notification.clone(),
                at: self.clock.now(),
            });
            let overflow = history.len().saturating_sub(HISTORY_LIMIT);
            history.drain(..overflow);
            if let Err(err) = self.local.write(keys::NOTIFICATIONS, &history).await {
                tracing::warn!("failed to persist notification history: {err}");
            }
        }
        self.inner.notify(notification).await;
    }
}
