//! T-Beam LoRaWAN telemetry node library.
//!
//! Everything except the ESP32 platform services is hardware independent and
//! runs on the host: the payload encoder, the radio session state machine,
//! persistence, sensors and the duty-cycle loop itself, driven by simulated
//! peripherals.

pub mod config;
pub mod lora;
pub mod lpp;
pub mod node;
pub mod packer;
pub mod persistence;
pub mod platform;
pub mod power;
pub mod sensors;

// Re-export commonly used items
pub use config::{ConfigError, NodeConfig, OtaaCredentials};
pub use lora::{RadioSession, SessionEvent, TransmissionOutcome, TransmissionRequest};
pub use lpp::{EncodeError, PayloadEncoder};
pub use node::{NodeError, Peripherals, TelemetryNode};
