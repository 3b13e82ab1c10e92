//! Node configuration.
//!
//! # Components
//!
//! - `node` - duty cycle, radio and payload settings plus the LPP channel map
//! - `credentials` - OTAA credentials and the radio pin mapping
//!
//! Defaults reproduce the T-Beam firmware build: one confirmed uplink per
//! minute on port 1, SF7 with ADR, a 51-byte payload ceiling and a 15 minute
//! loop watchdog.

mod credentials;
mod node;

pub use credentials::{OtaaCredentials, PinMapping};
pub use node::{ChannelMap, ConfigError, NodeConfig, MAX_LORAWAN_PAYLOAD};
