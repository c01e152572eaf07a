//! Debounced drain trigger.
//!
//! Rapid local edits each signal "something changed"; only the first
//! quiet period after a burst should cost a network round trip. The
//! trigger owns a background task with a restartable timer: every
//! `schedule()` call resets it, and the wrapped action runs once when it
//! expires uninterrupted.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// Quiet period before a scheduled drain fires. Not user-configurable.
pub const QUIET_PERIOD: Duration = Duration::from_millis(1500);

/// Coalesces bursts of sync signals into single drain invocations.
///
/// Holds no queue state; this is purely a timing policy.
pub struct DebouncedTrigger {
    tx: mpsc::Sender<()>,
}

impl DebouncedTrigger {
    /// Start the trigger with the default quiet period.
    pub fn start<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_quiet_period(QUIET_PERIOD, action)
    }

    /// Start the trigger with an explicit quiet period (tests).
    pub fn with_quiet_period<F, Fut>(quiet_period: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Capacity 1: a signal arriving while one is already pending
        // coalesces with it instead of queueing another cycle.
        let (tx, mut rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Quiet period; restarted by every further signal.
                loop {
                    tokio::select! {
                        _ = time::sleep(quiet_period) => {
                            action().await;
                            break;
                        }
                        signal = rx.recv() => {
                            if signal.is_none() {
                                return;
                            }
                            // Timer restarts on the next loop iteration
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Signal that something changed and a drain should follow a pause.
    ///
    /// Cheap and non-blocking; safe to call on every keystroke-level edit.
    pub fn schedule(&self) {
        // Full channel means a signal is already pending - coalesce.
        let _ = self.tx.try_send(());
    }
}
