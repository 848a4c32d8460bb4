//! Cooperative shutdown signal shared by every trading loop.
//!
//! A hand-rolled flag-plus-notify pair rather than `tokio_util`'s
//! `CancellationToken` — this workspace doesn't otherwise depend on
//! `tokio-util`, and the three things a loop needs (check, wait, trigger)
//! are cheap to roll directly on `tokio::sync::Notify`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// True once [`Shutdown::trigger`] has been called. Loops poll this at
    /// the top of every iteration.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Signal every waiter. Idempotent — triggering twice is a no-op past
    /// the first call.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves immediately if already triggered, otherwise waits for the
    /// next [`Shutdown::trigger`] call. Intended to race against a loop's own
    /// `tokio::time::sleep`/channel-recv future via `tokio::select!`.
    pub async fn triggered(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn triggered_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.triggered().await;
        });

        shutdown.trigger();
        handle.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn triggered_returns_immediately_if_already_triggered() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        // Must not hang.
        shutdown.triggered().await;
    }
}
