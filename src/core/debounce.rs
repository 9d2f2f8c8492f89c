//! Coalescing of background writes

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

/// Quiet period before a scheduled write runs
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

type PendingOp = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Slot {
    generation: u64,
    op: Option<PendingOp>,
}

/// Runs only the most recently scheduled operation, once the delay has
/// passed without another `schedule` call.
///
/// An operation that has already started is never interrupted.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    handle: Handle,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    /// Create a debouncer; must be called inside a tokio runtime
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            handle: Handle::current(),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any pending operation with `op` and restart the timer
    pub fn schedule<F>(&self, op: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = {
            let mut slot = self.lock();
            slot.generation += 1;
            slot.op = Some(Box::pin(op));
            slot.generation
        };

        let slot = Arc::clone(&self.slot);
        let delay = self.delay;
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let op = {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.generation != generation {
                    return;
                }
                slot.op.take()
            };
            if let Some(op) = op {
                op.await;
            }
        });
        tracing::trace!("Scheduled debounced write #{}", generation);
    }

    /// Run the pending operation now, if there is one
    pub async fn flush_now(&self) {
        let op = self.lock().op.take();
        if let Some(op) = op {
            tracing::debug!("Flushing pending write");
            op.await;
        }
    }

    /// Drop the pending operation without running it
    #[allow(dead_code)]
    pub fn cancel_pending(&self) {
        if self.lock().op.take().is_some() {
            tracing::debug!("Cancelled pending write");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.lock().op.is_some()
    }
}
