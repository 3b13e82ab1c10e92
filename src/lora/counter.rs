//! Uplink frame counter with rate-limited persistence.
//!
//! The in-memory value is authoritative. It is written to flash at most once
//! per flush interval to bound wear; a crash loses at most one interval of
//! increments, which the network tolerates as a counter gap.
//!
//! # Example
//!
//! ```
//! use tbeam_node::lora::UplinkCounter;
//! use tbeam_node::persistence::MemoryStore;
//!
//! let mut store = MemoryStore::new();
//! let mut counter = UplinkCounter::new(41, 300_000);
//!
//! assert!(counter.flush(&mut store, 0)); // first flush always writes
//! counter.increment();
//! assert!(!counter.flush(&mut store, 1_000)); // too soon
//! assert_eq!(counter.value(), 42);
//! ```

use super::session::{KEY_COUNT, NAMESPACE};
use crate::persistence::PersistenceStore;
use log::{debug, error, info};

/// Monotonic uplink counter.
#[derive(Debug, Clone)]
pub struct UplinkCounter {
    value: u32,
    flush_interval_ms: u64,
    last_flush_ms: Option<u64>,
}

impl UplinkCounter {
    pub fn new(value: u32, flush_interval_ms: u64) -> Self {
        Self {
            value,
            flush_interval_ms,
            last_flush_ms: None,
        }
    }

    /// Seed from cross-sleep memory, falling back to flash on a cold boot.
    ///
    /// A retained value of 0 means retained memory was lost; the persisted
    /// `count` (or 0 if absent) is used instead.
    pub fn seed(retained: u32, store: &mut dyn PersistenceStore, flush_interval_ms: u64) -> Self {
        if retained != 0 {
            debug!("Uplink counter from retained memory: {}", retained);
            return Self::new(retained, flush_interval_ms);
        }
        let value = match store.open(NAMESPACE, true) {
            Ok(ns) => ns.get_u32(KEY_COUNT, 0),
            Err(e) => {
                debug!("No persisted counter: {}", e);
                0
            }
        };
        info!("Uplink counter restored from flash: {}", value);
        Self::new(value, flush_interval_ms)
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Count one queued uplink.
    pub fn increment(&mut self) {
        self.value = self.value.wrapping_add(1);
    }

    /// Whether the next [`flush`](Self::flush) at `now_ms` would write.
    pub fn flush_due(&self, now_ms: u64) -> bool {
        match self.last_flush_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.flush_interval_ms,
        }
    }

    /// Write the counter if the first flush or the interval has elapsed.
    ///
    /// Returns whether a write happened. Failures are logged and retried on
    /// the next call.
    pub fn flush(&mut self, store: &mut dyn PersistenceStore, now_ms: u64) -> bool {
        if !self.flush_due(now_ms) {
            return false;
        }
        let result = store
            .open(NAMESPACE, false)
            .and_then(|mut ns| ns.put_u32(KEY_COUNT, self.value));
        match result {
            Ok(_) => {
                debug!("Uplink counter {} flushed", self.value);
                self.last_flush_ms = Some(now_ms);
                true
            }
            Err(e) => {
                error!("Failed to persist uplink counter: {}", e);
                false
            }
        }
    }
}
