//! Cayenne LPP payload encoding.
//!
//! This module contains:
//! - `types`: the LPP type table (codes, widths, multipliers)
//! - `encoder`: fixed-capacity payload encoder
//! - `decoder`: reference decoder matching the network-side formatter

mod decoder;
mod encoder;
mod types;

pub use decoder::{decode, DecodeError};
pub use encoder::{EncodeError, PayloadEncoder, Sample, Value};
pub use types::{Layout, LppType};
