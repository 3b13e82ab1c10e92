//! State carried across deep sleep.
//!
//! Lives in RTC slow memory on the ESP32: it survives deep sleep but not a
//! power cycle. It is never written to flash.

use crate::sensors::Position;
use log::{debug, info};
use std::cell::Cell;
use std::rc::Rc;

/// Cross-sleep state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RetainedState {
    /// Boots since the last cold boot. Non-positive means lost or wrapped.
    pub boot_count: i32,
    /// Acquire a GPS fix on the next cycle.
    pub want_gps: bool,
    /// Uplink counter at the time of the last sleep.
    pub uplink_sequence: u32,
    /// Last position obtained from the GPS.
    pub last_position: Option<Position>,
}

impl RetainedState {
    /// Bookkeeping at the start of every boot.
    ///
    /// A non-positive `boot_count` means retained memory was lost (cold boot)
    /// or the counter wrapped; everything is reset and a GPS fix is requested.
    /// Returns whether this was such a reset.
    pub fn begin_boot(&mut self) -> bool {
        let reset = self.boot_count <= 0;
        if reset {
            *self = Self {
                want_gps: true,
                ..Self::default()
            };
        }
        self.boot_count = self.boot_count.wrapping_add(1);
        debug!("Boot counter: {} boots", self.boot_count);
        reset
    }
}

/// Load/store hooks at the power-lifecycle boundary.
pub trait RetainedMemory {
    fn load(&mut self) -> RetainedState;
    fn store(&mut self, state: &RetainedState);
}

/// Retained memory kept on the heap, for host simulation where "deep sleep"
/// never leaves the process. Clones share the same state, like every boot
/// sharing the same RTC memory.
#[derive(Debug, Default, Clone)]
pub struct RamRetained {
    state: Rc<Cell<RetainedState>>,
}

impl RamRetained {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RetainedState {
        self.state.get()
    }
}

impl RetainedMemory for RamRetained {
    fn load(&mut self) -> RetainedState {
        self.state.get()
    }

    fn store(&mut self, state: &RetainedState) {
        self.state.set(*state);
    }
}

#[cfg(feature = "esp32")]
mod rtc {
    use super::{RetainedMemory, RetainedState};
    use crate::sensors::Position;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct RtcRecord {
        boot_count: i32,
        want_gps: bool,
        has_position: bool,
        uplink_sequence: u32,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    }

    // Zeroed from the image on power-on, kept across deep sleep.
    #[link_section = ".rtc.data"]
    static mut RTC_RECORD: RtcRecord = RtcRecord {
        boot_count: 0,
        want_gps: false,
        has_position: false,
        uplink_sequence: 0,
        latitude: 0.0,
        longitude: 0.0,
        altitude: 0.0,
    };

    /// Retained state in RTC slow memory.
    ///
    /// Only one instance may exist; the main task is the only accessor.
    pub struct RtcRetained {
        _private: (),
    }

    impl RtcRetained {
        /// # Safety
        ///
        /// Must be created at most once and used from a single task.
        pub unsafe fn take() -> Self {
            Self { _private: () }
        }
    }

    impl RetainedMemory for RtcRetained {
        fn load(&mut self) -> RetainedState {
            let record = unsafe { core::ptr::addr_of!(RTC_RECORD).read() };
            RetainedState {
                boot_count: record.boot_count,
                want_gps: record.want_gps,
                uplink_sequence: record.uplink_sequence,
                last_position: record
                    .has_position
                    .then(|| Position::new(record.latitude, record.longitude, record.altitude)),
            }
        }

        fn store(&mut self, state: &RetainedState) {
            let position = state.last_position.unwrap_or_default();
            let record = RtcRecord {
                boot_count: state.boot_count,
                want_gps: state.want_gps,
                has_position: state.last_position.is_some(),
                uplink_sequence: state.uplink_sequence,
                latitude: position.latitude,
                longitude: position.longitude,
                altitude: position.altitude,
            };
            unsafe { core::ptr::addr_of_mut!(RTC_RECORD).write(record) };
        }
    }
}

#[cfg(feature = "esp32")]
pub use rtc::RtcRetained;

/// Load retained state and run boot bookkeeping.
pub fn boot(memory: &mut dyn RetainedMemory) -> RetainedState {
    let mut state = memory.load();
    if state.begin_boot() {
        info!("Cold boot, retained state reset");
    }
    memory.store(&state);
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_boot_resets_and_wants_gps() {
        let mut state = RetainedState {
            boot_count: 0,
            want_gps: false,
            uplink_sequence: 17,
            last_position: Some(Position::new(1.0, 2.0, 3.0)),
        };
        assert!(state.begin_boot());
        assert_eq!(state.boot_count, 1);
        assert!(state.want_gps);
        assert_eq!(state.uplink_sequence, 0);
        assert!(state.last_position.is_none());
    }

    #[test]
    fn test_wake_keeps_state() {
        let mut state = RetainedState {
            boot_count: 4,
            want_gps: false,
            uplink_sequence: 17,
            last_position: None,
        };
        assert!(!state.begin_boot());
        assert_eq!(state.boot_count, 5);
        assert!(!state.want_gps);
        assert_eq!(state.uplink_sequence, 17);
    }

    #[test]
    fn test_wrapped_counter_resets_on_next_boot() {
        let mut state = RetainedState {
            boot_count: i32::MAX,
            ..RetainedState::default()
        };
        assert!(!state.begin_boot());
        assert!(state.boot_count < 0);
        assert!(state.begin_boot());
        assert_eq!(state.boot_count, 1);
    }

    #[test]
    fn test_boot_stores_bookkeeping() {
        let mut memory = RamRetained::new();
        let first = boot(&mut memory);
        assert_eq!(first.boot_count, 1);
        let second = boot(&mut memory);
        assert_eq!(second.boot_count, 2);
        assert_eq!(memory.state().boot_count, 2);
    }
}
