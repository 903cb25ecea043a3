use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll granularity for interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Cooperative cancellation shared by the worker loop, the watcher, queue
/// blocking and chunked copies. Cloning yields a handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent; observers react at their next poll point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` when the sleep was interrupted by cancellation.
    pub fn sleep_interruptible(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
