//! Power lifecycle.
//!
//! This module contains:
//! - [`Rail`] and the [`PowerRails`] capability (PMU sub-rails)
//! - [`RetainedState`]: what survives deep sleep, with [`RetainedMemory`] hooks
//! - [`compute_sleep_ms`]: phase-aligned sleep duration

mod retained;

pub use retained::{boot, RamRetained, RetainedMemory, RetainedState};
#[cfg(feature = "esp32")]
pub use retained::RtcRetained;

use log::debug;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Switchable PMU outputs on the T-Beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rail {
    /// LDO2, SX1276 radio.
    Lora,
    /// LDO3, GPS receiver.
    Gps,
    /// DCDC1, external sensor header.
    Sensors,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lora => write!(f, "LoRa (LDO2)"),
            Self::Gps => write!(f, "GPS (LDO3)"),
            Self::Sensors => write!(f, "Sensors (DCDC1)"),
        }
    }
}

/// Power management unit capability.
pub trait PowerRails {
    fn enable_rail(&mut self, rail: Rail);
    fn disable_rail(&mut self, rail: Rail);
}

/// Rails without a PMU behind them; records and logs what would be switched.
///
/// Clones share the same switch state.
#[derive(Debug, Default, Clone)]
pub struct TrackedRails {
    enabled: Rc<RefCell<BTreeSet<Rail>>>,
}

impl TrackedRails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, rail: Rail) -> bool {
        self.enabled.borrow().contains(&rail)
    }
}

impl PowerRails for TrackedRails {
    fn enable_rail(&mut self, rail: Rail) {
        debug!("{}: ON", rail);
        self.enabled.borrow_mut().insert(rail);
    }

    fn disable_rail(&mut self, rail: Rail) {
        debug!("{}: OFF", rail);
        self.enabled.borrow_mut().remove(&rail);
    }
}

/// Why the MCU is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// Power-on or reset; retained memory is not trustworthy.
    ColdBoot,
    /// Deep sleep timer expired.
    Timer,
    /// User button pulled the wake pin low.
    Button,
}

/// Sleep time that puts the next wake `interval_ms` after this boot.
///
/// Floors at zero when the cycle overran the interval.
pub fn compute_sleep_ms(interval_ms: u64, elapsed_ms: u64) -> u64 {
    interval_ms.saturating_sub(elapsed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_phase_aligned() {
        assert_eq!(compute_sleep_ms(60_000, 0), 60_000);
        assert_eq!(compute_sleep_ms(60_000, 12_345), 47_655);
    }

    #[test]
    fn test_sleep_floors_at_zero() {
        assert_eq!(compute_sleep_ms(60_000, 60_000), 0);
        assert_eq!(compute_sleep_ms(60_000, 90_000), 0);
    }

    #[test]
    fn test_tracked_rails_shared_between_clones() {
        let observer = TrackedRails::new();
        let mut rails = observer.clone();
        rails.enable_rail(Rail::Lora);
        rails.enable_rail(Rail::Gps);
        rails.disable_rail(Rail::Gps);

        assert!(observer.is_enabled(Rail::Lora));
        assert!(!observer.is_enabled(Rail::Gps));
        assert!(!observer.is_enabled(Rail::Sensors));
    }
}
