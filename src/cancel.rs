//! Minimal cooperative cancellation token, shared by the scrape scheduler
//! and the ingest pipeline's worker pools.
//!
//! The example pack's dependency stack has no `tokio-util` in scope for
//! this crate, so rather than add an unlisted dependency for a single
//! `CancellationToken`-shaped need, this reproduces just the slice used
//! here (clone-and-share a flag, `cancelled()` awaits it) on top of
//! `tokio::sync::Notify`, the same primitive `tokio-util` itself is built on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn cancelled(&self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
