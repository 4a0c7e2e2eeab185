//! Offline/online toggle owned outside the delivery subsystem.

use std::sync::Arc;

use tokio::sync::watch;

/// Source of the offline flag.
///
/// The orchestrator samples it once per submission; changes during a
/// delivery do not affect that delivery.
pub trait ModeSource: Send + Sync {
    fn is_offline(&self) -> bool;
}

/// Push-based offline toggle.
///
/// Cloning shares the same flag. Observers can [`subscribe`](Self::subscribe)
/// to be woken on changes instead of polling.
#[derive(Debug, Clone)]
pub struct ModeFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl ModeFlag {
    pub fn new(offline: bool) -> Self {
        let (tx, _rx) = watch::channel(offline);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag. Subscribers are notified only on an actual change.
    pub fn set_offline(&self, offline: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == offline {
                false
            } else {
                *current = offline;
                true
            }
        });
        if changed {
            tracing::info!(offline, "Mode flag changed");
        }
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&self) -> bool {
        let next = !self.is_offline();
        self.set_offline(next);
        next
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ModeFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ModeSource for ModeFlag {
    fn is_offline(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value() {
        assert!(ModeFlag::new(true).is_offline());
        assert!(!ModeFlag::default().is_offline());
    }

    #[test]
    fn test_clones_share_state() {
        let a = ModeFlag::new(false);
        let b = a.clone();
        a.set_offline(true);
        assert!(b.is_offline());
    }

    #[test]
    fn test_toggle() {
        let flag = ModeFlag::new(false);
        assert!(flag.toggle());
        assert!(!flag.toggle());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let flag = ModeFlag::new(false);
        let mut rx = flag.subscribe();
        flag.set_offline(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_setting_same_value_does_not_notify() {
        let flag = ModeFlag::new(true);
        let rx = flag.subscribe();
        flag.set_offline(true);
        assert!(!rx.has_changed().unwrap());
    }
}
