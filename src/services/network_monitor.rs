//! Network reachability monitor.
//!
//! A thin state mirror: the platform layer reports reachability
//! transitions and the monitor keeps a boolean plus one registered
//! callback fired on each offline-to-online edge. No polling, no retries,
//! no debouncing here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type OnlineCallback = Arc<dyn Fn() + Send + Sync>;

/// Mirrors the platform's reachability signal.
pub struct NetworkMonitor {
    online: AtomicBool,
    on_online: Mutex<Option<OnlineCallback>>,
}

impl NetworkMonitor {
    /// Create a monitor seeded from the platform's current reachability.
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            on_online: Mutex::new(None),
        }
    }

    /// Current reachability state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register the callback fired on every offline-to-online transition.
    ///
    /// The sync engine registers a drain trigger here. Replaces any
    /// previously registered callback.
    pub fn on_online(&self, callback: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_online.lock() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Platform event handler for reachability transitions.
    ///
    /// Updates the mirrored state synchronously; fires the registered
    /// callback only on a genuine offline-to-online edge, not on repeated
    /// online reports.
    pub fn set_reachable(&self, reachable: bool) {
        let was_online = self.online.swap(reachable, Ordering::SeqCst);

        if reachable && !was_online {
            log::info!("Network became reachable");
            // Clone out so the callback runs without holding the lock;
            // it may call straight back into the sync engine.
            let callback = self.on_online.lock().ok().and_then(|slot| slot.clone());
            if let Some(callback) = callback {
                callback();
            }
        } else if !reachable && was_online {
            log::info!("Network became unreachable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        assert!(NetworkMonitor::new(true).is_online());
        assert!(!NetworkMonitor::new(false).is_online());
    }

    #[test]
    fn test_transitions_update_state() {
        let monitor = NetworkMonitor::new(true);

        monitor.set_reachable(false);
        assert!(!monitor.is_online());

        monitor.set_reachable(true);
        assert!(monitor.is_online());
    }

    #[test]
    fn test_callback_fires_on_online_edge() {
        let monitor = NetworkMonitor::new(false);
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        monitor.on_online(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_reachable(true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_not_fired_on_repeated_online() {
        let monitor = NetworkMonitor::new(false);
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        monitor.on_online(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_reachable(true);
        monitor.set_reachable(true);
        monitor.set_reachable(true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // A full offline/online cycle fires again
        monitor.set_reachable(false);
        monitor.set_reachable(true);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_not_fired_on_offline_edge() {
        let monitor = NetworkMonitor::new(true);
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        monitor.on_online(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_reachable(false);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
