//! Host platform with a virtual clock.
//!
//! Delays advance the clock instantly (optionally scaled to real time so a
//! simulation can be watched), and deep sleep starts a new "boot" at t = 0
//! with a timer or button wake cause. Nothing here ever leaves the process.

use super::{Platform, SoftWatchdog};
use crate::power::WakeCause;
use log::{error, info};
use std::thread;
use std::time::Duration;

/// Virtual-clock platform.
#[derive(Debug)]
pub struct HostPlatform {
    now_ms: u64,
    wake_cause: WakeCause,
    real_time_divisor: Option<u64>,
    watchdog: Option<SoftWatchdog>,
    sleeps: Vec<u64>,
    feeds: u64,
    halted: Option<String>,
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPlatform {
    /// Cold boot at t = 0, no real-time delays, no watchdog.
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            wake_cause: WakeCause::ColdBoot,
            real_time_divisor: None,
            watchdog: None,
            sleeps: Vec::new(),
            feeds: 0,
            halted: None,
        }
    }

    /// Also sleep the thread for `1/divisor` of every delay.
    pub fn with_real_time(mut self, divisor: u64) -> Self {
        self.real_time_divisor = Some(divisor.max(1));
        self
    }

    /// Feed `watchdog` on every [`Platform::feed_watchdog`].
    pub fn with_watchdog(mut self, watchdog: SoftWatchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Pretend this boot was a wake from deep sleep.
    pub fn with_wake_cause(mut self, cause: WakeCause) -> Self {
        self.wake_cause = cause;
        self
    }

    /// Move the clock without a delay call, e.g. to model a slow sensor.
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    /// Durations of every deep sleep entered so far.
    pub fn sleeps(&self) -> &[u64] {
        &self.sleeps
    }

    pub fn feeds(&self) -> u64 {
        self.feeds
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }
}

impl Platform for HostPlatform {
    fn millis(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u64) {
        if let Some(divisor) = self.real_time_divisor {
            thread::sleep(Duration::from_millis(ms / divisor));
        }
        self.now_ms += ms;
    }

    fn feed_watchdog(&mut self) {
        self.feeds += 1;
        if let Some(watchdog) = &self.watchdog {
            watchdog.feed();
        }
    }

    fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }

    fn deep_sleep(&mut self, ms: u64, wake_on_button: bool) {
        info!(
            "Entering deep sleep for {} s (button wake: {})",
            ms / 1000,
            wake_on_button
        );
        if let Some(divisor) = self.real_time_divisor {
            thread::sleep(Duration::from_millis(ms / divisor));
        }
        self.sleeps.push(ms);
        self.now_ms = 0;
        self.wake_cause = WakeCause::Timer;
    }

    fn halt(&mut self, reason: &str) {
        error!("HALTED: {}", reason);
        self.halted = Some(reason.to_string());
    }
}
