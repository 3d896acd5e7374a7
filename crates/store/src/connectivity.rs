//! Online/offline tracking.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

/// A real change of connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Offline -> Online`; triggers one queue replay.
    CameOnline,
    WentOffline,
}

/// Current connectivity, broadcast to subscribers on every change.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Record the runtime signal; returns the transition only when the state
    /// actually changed.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let next = ConnectivityState::from_online(online);
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if !changed {
            return None;
        }
        tracing::info!("connectivity changed to {next:?}");
        Some(if online {
            Transition::CameOnline
        } else {
            Transition::WentOffline
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_changes_yield_transitions() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        assert_eq!(monitor.set_online(false), None);
        assert_eq!(monitor.set_online(true), Some(Transition::CameOnline));
        assert_eq!(monitor.set_online(true), None);
        assert_eq!(monitor.set_online(false), Some(Transition::WentOffline));
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Offline);

        // No-op updates do not wake subscribers.
        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());
    }
}
