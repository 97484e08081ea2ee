//! One-shot timers with cancellation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Work to run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Scheduling capability handed to components that need timers.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `delay`.
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled.
    fn cancel(&self, handle: TimerHandle) -> bool;

    fn cancel_all(&self);

    /// Timers armed and not yet fired.
    fn pending(&self) -> usize;
}

/// [`Scheduler`] backed by tokio tasks.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    timers: Arc<DashMap<u64, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            // Deregister before running so the callback can re-arm without
            // aborting itself.
            if timers.remove(&id).is_some() {
                callback().await;
            }
        });
        self.timers.insert(id, task);
        let _ = armed_tx.send(());

        tracing::debug!(timer_id = id, delay_ms = delay.as_millis() as u64, "Timer armed");
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle.0) {
            Some((_, task)) => {
                task.abort();
                tracing::debug!(timer_id = handle.0, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        let ids: Vec<u64> = self.timers.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.cancel(TimerHandle(id));
        }
    }

    fn pending(&self) -> usize {
        self.timers.len()
    }
}
