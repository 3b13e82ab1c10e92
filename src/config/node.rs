//! Duty-cycle node settings.
//!
//! Platform-independent, so it can be validated and unit tested on the host.
//! On host builds the types derive serde so the `node` binary can read them
//! from a JSON file.
//!
//! # Example
//!
//! ```
//! use tbeam_node::config::NodeConfig;
//!
//! let config = NodeConfig {
//!     send_interval_ms: 120_000,
//!     ..NodeConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use super::PinMapping;
use crate::lora::SpreadingFactor;
use crate::sensors::Position;
use std::fmt;

/// Largest application payload LoRaWAN allows at any data rate.
pub const MAX_LORAWAN_PAYLOAD: usize = 242;

/// Cayenne LPP channel assigned to every field the node can report.
///
/// Channel ids are what the network-side decoder uses to tell fields apart,
/// so they must stay stable across firmware versions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(not(target_os = "espidf"), serde(default))]
pub struct ChannelMap {
    pub gps: u8,
    pub wind_speed: u8,
    pub irradiance: u8,
    pub pm1_mass: u8,
    pub pm2_5_mass: u8,
    pub pm4_mass: u8,
    pub pm10_mass: u8,
    pub pm0_5_count: u8,
    pub pm1_count: u8,
    pub pm2_5_count: u8,
    pub pm4_count: u8,
    pub pm10_count: u8,
    pub particle_size: u8,
    pub temperature: u8,
    pub average_temperature: u8,
    pub pressure: u8,
    pub gas_resistance: u8,
    pub humidity: u8,
    pub baro_altitude: u8,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            gps: 1,
            wind_speed: 2,
            irradiance: 3,
            pm1_mass: 10,
            pm2_5_mass: 11,
            pm4_mass: 12,
            pm10_mass: 13,
            pm0_5_count: 14,
            pm1_count: 15,
            pm2_5_count: 16,
            pm4_count: 17,
            pm10_count: 18,
            particle_size: 19,
            temperature: 20,
            average_temperature: 21,
            pressure: 22,
            gas_resistance: 23,
            humidity: 24,
            baro_altitude: 25,
        }
    }
}

/// Runtime configuration of the telemetry node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(not(target_os = "espidf"), serde(default))]
pub struct NodeConfig {
    /// Duty-cycle period; wake times are phase-aligned to it.
    pub send_interval_ms: u64,
    /// LoRaWAN application port for telemetry uplinks.
    pub lorawan_port: u8,
    /// Request a network acknowledgment for every uplink.
    pub confirmed_uplinks: bool,
    /// Payload buffer capacity in bytes.
    pub max_payload: usize,
    pub spreading_factor: SpreadingFactor,
    pub adaptive_data_rate: bool,
    pub tx_power_dbm: i8,
    /// Minimum spacing between two uplink counter writes to flash.
    pub counter_flush_interval_ms: u64,
    /// Upper bound on waiting for a GPS fix. `None` waits forever.
    pub gps_wait_for_lock_ms: Option<u64>,
    /// Extra position reads taken after the first valid fix.
    pub gps_refine_samples: u32,
    pub gps_refine_interval_ms: u64,
    /// Attempts at reading a sensor that reports invalid data.
    pub sensor_retry_limit: u32,
    pub sensor_retry_delay_ms: u64,
    pub watchdog_timeout_ms: u64,
    /// Pause between main loop iterations while waiting.
    pub loop_delay_ms: u64,
    /// Position reported until the first GPS fix is ever obtained.
    pub default_position: Position,
    pub channels: ChannelMap,
    pub pins: PinMapping,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: 60_000,
            lorawan_port: 1,
            confirmed_uplinks: true,
            max_payload: 51,
            spreading_factor: SpreadingFactor::Sf7,
            adaptive_data_rate: true,
            tx_power_dbm: 14,
            counter_flush_interval_ms: 5 * 60 * 1000,
            gps_wait_for_lock_ms: Some(5 * 60 * 1000),
            gps_refine_samples: 20,
            gps_refine_interval_ms: 1_000,
            sensor_retry_limit: 5,
            sensor_retry_delay_ms: 500,
            watchdog_timeout_ms: 15 * 60 * 1000,
            loop_delay_ms: 100,
            default_position: Position::default(),
            channels: ChannelMap::default(),
            pins: PinMapping::default(),
        }
    }
}

impl NodeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_interval_ms == 0 {
            return Err(ConfigError::Invalid("send_interval_ms must be > 0"));
        }
        if self.max_payload == 0 || self.max_payload > MAX_LORAWAN_PAYLOAD {
            return Err(ConfigError::Invalid("max_payload must be within 1..=242"));
        }
        // Port 0 carries MAC commands, 224 and above are reserved.
        if self.lorawan_port == 0 || self.lorawan_port >= 224 {
            return Err(ConfigError::Invalid("lorawan_port must be within 1..=223"));
        }
        if self.watchdog_timeout_ms <= self.loop_delay_ms {
            return Err(ConfigError::Invalid(
                "watchdog_timeout_ms must exceed loop_delay_ms",
            ));
        }
        if self.sensor_retry_limit == 0 {
            return Err(ConfigError::Invalid("sensor_retry_limit must be > 0"));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting is out of range.
    Invalid(&'static str),
    /// A credential string is not valid hex of the expected length.
    BadCredential { field: &'static str, expected: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
            Self::BadCredential { field, expected } => {
                write!(f, "{} must be {} hex digits", field, expected * 2)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
