//! Board services used by the duty-cycle loop.
//!
//! This module contains:
//! - [`Platform`]: clock, delays, watchdog, deep sleep, halt
//! - [`UserInput`]: user button requests
//! - [`HostPlatform`]: virtual-clock implementation for host runs and tests
//! - [`SoftWatchdog`]: thread-based watchdog for host runs
//! - [`ButtonDecoder`]: hold / double-click detection
//! - `Esp32Platform`, `Esp32Button` (ESP32 only)

mod button;
#[cfg(feature = "esp32")]
mod esp32;
mod host;
mod watchdog;

pub use button::ButtonDecoder;
#[cfg(feature = "esp32")]
pub use esp32::{Esp32Button, Esp32Platform};
pub use host::HostPlatform;
pub use watchdog::SoftWatchdog;

use crate::power::WakeCause;
use std::collections::VecDeque;

/// Board services.
pub trait Platform {
    /// Milliseconds since this boot (or wake).
    fn millis(&self) -> u64;

    /// Block for `ms`. The radio is not serviced meanwhile.
    fn delay_ms(&mut self, ms: u64);

    /// Prove forward progress to the watchdog.
    fn feed_watchdog(&mut self);

    /// What started this boot.
    fn wake_cause(&self) -> WakeCause;

    /// Enter deep sleep for `ms`, optionally waking early on the user button.
    ///
    /// Does not return on hardware.
    fn deep_sleep(&mut self, ms: u64, wake_on_button: bool);

    /// Enter the halted diagnostic state after a fatal configuration error.
    fn halt(&mut self, reason: &str);
}

impl<T: Platform + ?Sized> Platform for &mut T {
    fn millis(&self) -> u64 {
        (**self).millis()
    }

    fn delay_ms(&mut self, ms: u64) {
        (**self).delay_ms(ms)
    }

    fn feed_watchdog(&mut self) {
        (**self).feed_watchdog()
    }

    fn wake_cause(&self) -> WakeCause {
        (**self).wake_cause()
    }

    fn deep_sleep(&mut self, ms: u64, wake_on_button: bool) {
        (**self).deep_sleep(ms, wake_on_button)
    }

    fn halt(&mut self, reason: &str) {
        (**self).halt(reason)
    }
}

/// Request made with the user button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRequest {
    /// Hold: acquire and send a GPS position on the next cycle.
    SendPosition,
    /// Double click: forget the session and join again.
    ResetSession,
}

/// Source of user requests, polled every loop iteration.
pub trait UserInput {
    fn poll(&mut self, now_ms: u64) -> Option<UserRequest>;
}

/// No button fitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl UserInput for NoInput {
    fn poll(&mut self, _now_ms: u64) -> Option<UserRequest> {
        None
    }
}

/// Requests delivered at fixed times, for simulation and tests.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    script: VecDeque<(u64, UserRequest)>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `request` on the first poll at or after `at_ms`.
    pub fn at(mut self, at_ms: u64, request: UserRequest) -> Self {
        self.script.push_back((at_ms, request));
        self
    }
}

impl UserInput for ScriptedInput {
    fn poll(&mut self, now_ms: u64) -> Option<UserRequest> {
        match self.script.front() {
            Some(&(at, request)) if now_ms >= at => {
                self.script.pop_front();
                Some(request)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_in_order() {
        let mut input = ScriptedInput::new()
            .at(100, UserRequest::SendPosition)
            .at(200, UserRequest::ResetSession);

        assert_eq!(input.poll(50), None);
        assert_eq!(input.poll(150), Some(UserRequest::SendPosition));
        assert_eq!(input.poll(160), None);
        assert_eq!(input.poll(250), Some(UserRequest::ResetSession));
        assert_eq!(input.poll(300), None);
    }
}
