//! ESP32 board services.
//!
//! Task watchdog with panic on expiry (the panic handler restarts the chip),
//! timer + button deep sleep, and the active-low user button.

use super::{ButtonDecoder, Platform, UserInput, UserRequest};
use crate::power::WakeCause;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, Input, PinDriver};
use esp_idf_sys::{self as sys, EspError};
use log::{error, info};

/// ESP32 platform.
pub struct Esp32Platform {
    button_gpio: u8,
}

impl Esp32Platform {
    /// Arm the task watchdog for the calling task.
    ///
    /// An expired watchdog panics, which restarts the chip.
    pub fn new(watchdog_timeout_ms: u64, button_gpio: u8) -> Result<Self, EspError> {
        let config = sys::esp_task_wdt_config_t {
            timeout_ms: watchdog_timeout_ms.min(u32::MAX as u64) as u32,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        let rc = unsafe { sys::esp_task_wdt_init(&config) };
        if rc == sys::ESP_ERR_INVALID_STATE {
            // Already running from the bootloader config; apply our timeout.
            sys::esp!(unsafe { sys::esp_task_wdt_reconfigure(&config) })?;
        } else {
            sys::esp!(rc)?;
        }

        let rc = unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) };
        if rc != sys::ESP_ERR_INVALID_STATE {
            sys::esp!(rc)?;
        }
        info!("Watchdog configured: {} seconds", watchdog_timeout_ms / 1000);

        Ok(Self { button_gpio })
    }
}

impl Platform for Esp32Platform {
    fn millis(&self) -> u64 {
        (unsafe { sys::esp_timer_get_time() } / 1000) as u64
    }

    fn delay_ms(&mut self, ms: u64) {
        FreeRtos::delay_ms(ms.min(u32::MAX as u64) as u32);
    }

    fn feed_watchdog(&mut self) {
        if unsafe { sys::esp_task_wdt_reset() } != sys::ESP_OK {
            error!("!!! COULD NOT RESET WATCHDOG !!!");
        }
    }

    fn wake_cause(&self) -> WakeCause {
        #[allow(non_upper_case_globals)]
        match unsafe { sys::esp_sleep_get_wakeup_cause() } {
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0
            | sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 => WakeCause::Button,
            _ => WakeCause::ColdBoot,
        }
    }

    fn deep_sleep(&mut self, ms: u64, wake_on_button: bool) {
        info!("Entering deep sleep for {} seconds", ms / 1000);
        unsafe {
            if wake_on_button {
                let gpio = self.button_gpio as sys::gpio_num_t;
                sys::gpio_pullup_en(gpio);
                sys::esp_sleep_enable_ext1_wakeup(
                    1u64 << self.button_gpio,
                    sys::esp_sleep_ext1_wakeup_mode_t_ESP_EXT1_WAKEUP_ALL_LOW,
                );
            }
            sys::esp_sleep_pd_config(
                sys::esp_sleep_pd_domain_t_ESP_PD_DOMAIN_RTC_PERIPH,
                sys::esp_sleep_pd_option_t_ESP_PD_OPTION_ON,
            );
            sys::esp_sleep_enable_timer_wakeup(ms.saturating_mul(1000));
            sys::esp_deep_sleep_start();
        }
    }

    fn halt(&mut self, reason: &str) {
        // Leave the watchdog so it does not turn the halt into a reboot loop.
        unsafe { sys::esp_task_wdt_delete(core::ptr::null_mut()) };
        loop {
            error!("HALTED: {}", reason);
            FreeRtos::delay_ms(10_000);
        }
    }
}

/// Active-low user button (GPIO 38 on the T-Beam).
pub struct Esp32Button {
    pin: PinDriver<'static, AnyInputPin, Input>,
    decoder: ButtonDecoder,
}

impl Esp32Button {
    pub fn new(pin: AnyInputPin) -> Result<Self, EspError> {
        Ok(Self {
            pin: PinDriver::input(pin)?,
            decoder: ButtonDecoder::new(),
        })
    }
}

impl UserInput for Esp32Button {
    fn poll(&mut self, now_ms: u64) -> Option<UserRequest> {
        self.decoder.update(self.pin.is_low(), now_ms)
    }
}
