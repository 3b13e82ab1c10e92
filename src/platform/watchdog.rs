//! Software watchdog for host runs.
//!
//! A background thread checks that [`SoftWatchdog::feed`] was called within
//! the timeout and runs the expiry handler once if it was not. On the ESP32
//! the task watchdog takes this role.

use log::{debug, error};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Thread-backed watchdog. Stops when dropped.
pub struct SoftWatchdog {
    epoch: Instant,
    /// Milliseconds since `epoch` at the last feed.
    last_feed_ms: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    expired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SoftWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftWatchdog")
            .field("expired", &self.has_expired())
            .finish()
    }
}

impl SoftWatchdog {
    /// Start watching. `on_expiry` runs on the watchdog thread.
    pub fn start<F>(timeout: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let epoch = Instant::now();
        let last_feed_ms = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let expired = Arc::new(AtomicBool::new(false));

        let check_every = (timeout / 4).clamp(Duration::from_millis(1), Duration::from_secs(1));
        let timeout_ms = timeout.as_millis() as u64;

        let handle = {
            let last_feed_ms = last_feed_ms.clone();
            let stop = stop.clone();
            let expired = expired.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(check_every);
                    let now = epoch.elapsed().as_millis() as u64;
                    let last = last_feed_ms.load(Ordering::Relaxed);
                    if now.saturating_sub(last) > timeout_ms {
                        error!("!!!! WATCHDOG TIMEOUT EXPIRED !!!!");
                        expired.store(true, Ordering::SeqCst);
                        on_expiry();
                        return;
                    }
                }
            })
        };

        debug!("Watchdog configured: {} ms", timeout_ms);
        Self {
            epoch,
            last_feed_ms,
            stop,
            expired,
            handle: Some(handle),
        }
    }

    /// Reset the timeout.
    pub fn feed(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_feed_ms.store(now, Ordering::Relaxed);
    }

    pub fn has_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl Drop for SoftWatchdog {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
