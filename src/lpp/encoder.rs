//! Payload encoder.
//!
//! Builds a fixed-capacity Cayenne LPP buffer from an ordered list of samples.
//! Encoding is all-or-nothing: the buffer is reset at the start of every
//! [`PayloadEncoder::encode`] call and left empty if any sample fails, so a
//! truncated payload can never reach the radio.
//!
//! # Example
//!
//! ```
//! use tbeam_node::lpp::{decode, PayloadEncoder, Sample};
//!
//! let mut encoder = PayloadEncoder::new(51);
//! encoder.encode(&[
//!     Sample::temperature(20, 21.5),
//!     Sample::relative_humidity(24, 48.0),
//! ]).unwrap();
//!
//! assert_eq!(encoder.len(), 7);
//! assert_eq!(decode(encoder.buffer()).unwrap().len(), 2);
//! ```

use super::types::{Layout, LppType};
use std::fmt;

/// Value carried by a sample, in engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector { x: f64, y: f64, z: f64 },
    Gps {
        latitude: f64,
        longitude: f64,
        altitude: f64,
    },
    Colour { r: u8, g: u8, b: u8 },
}

/// One reading to encode: channel id, LPP type code and value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub channel: u8,
    pub kind: u8,
    pub value: Value,
}

impl Sample {
    /// Sample of a known type.
    pub fn new(channel: u8, kind: LppType, value: Value) -> Self {
        Self {
            channel,
            kind: kind.code(),
            value,
        }
    }

    /// Sample with an arbitrary type code, as received from configuration.
    pub fn raw(channel: u8, code: u8, value: Value) -> Self {
        Self {
            channel,
            kind: code,
            value,
        }
    }

    pub fn temperature(channel: u8, celsius: f64) -> Self {
        Self::new(channel, LppType::Temperature, Value::Scalar(celsius))
    }

    pub fn relative_humidity(channel: u8, percent: f64) -> Self {
        Self::new(channel, LppType::RelativeHumidity, Value::Scalar(percent))
    }

    pub fn barometric_pressure(channel: u8, hpa: f64) -> Self {
        Self::new(channel, LppType::BarometricPressure, Value::Scalar(hpa))
    }

    pub fn altitude(channel: u8, meters: f64) -> Self {
        Self::new(channel, LppType::Altitude, Value::Scalar(meters))
    }

    /// Unsigned 32-bit reading with unit multiplier, rounded to whole units.
    pub fn generic(channel: u8, value: f64) -> Self {
        Self::new(channel, LppType::GenericSensor, Value::Scalar(value))
    }

    pub fn gps(channel: u8, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self::new(
            channel,
            LppType::Gps,
            Value::Gps {
                latitude,
                longitude,
                altitude,
            },
        )
    }
}

/// Encoding failures. Both indicate a configuration bug, not a runtime fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Appending a record would exceed the buffer capacity.
    Overflow {
        channel: u8,
        needed: usize,
        capacity: usize,
    },
    /// The type code has no encoding, or the value does not fit its layout.
    UnknownType { channel: u8, code: u8 },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow {
                channel,
                needed,
                capacity,
            } => write!(
                f,
                "payload overflow on channel {}: {} bytes needed, capacity {}",
                channel, needed, capacity
            ),
            Self::UnknownType { channel, code } => {
                write!(f, "unknown payload type {} on channel {}", code, channel)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Append-only payload buffer with a fixed capacity.
pub struct PayloadEncoder {
    buffer: Vec<u8>,
    capacity: usize,
}

impl PayloadEncoder {
    /// Create an encoder whose buffer never exceeds `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Encode `samples` in order, replacing the previous payload.
    ///
    /// Returns the payload size. On error the buffer is left empty.
    pub fn encode(&mut self, samples: &[Sample]) -> Result<usize, EncodeError> {
        self.reset();
        for sample in samples {
            if let Err(e) = self.append(sample) {
                self.reset();
                return Err(e);
            }
        }
        log::debug!("Payload size: {} B", self.buffer.len());
        Ok(self.buffer.len())
    }

    /// The finished payload.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Size of the finished payload in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard the current payload.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn append(&mut self, sample: &Sample) -> Result<(), EncodeError> {
        let unknown = EncodeError::UnknownType {
            channel: sample.channel,
            code: sample.kind,
        };
        let ty = LppType::from_code(sample.kind).ok_or_else(|| unknown.clone())?;

        let needed = self.buffer.len() + ty.record_size();
        if needed > self.capacity {
            return Err(EncodeError::Overflow {
                channel: sample.channel,
                needed,
                capacity: self.capacity,
            });
        }

        let mut record = Vec::with_capacity(ty.record_size());
        record.push(sample.channel);
        record.push(ty.code());
        let mult = ty.multiplier();

        match (ty.layout(), sample.value) {
            (Layout::Scalar { width, signed }, Value::Scalar(v)) => {
                write_int(&mut record, v * mult, width, signed);
            }
            (Layout::Vector { width }, Value::Vector { x, y, z }) => {
                for axis in [x, y, z] {
                    write_int(&mut record, axis * mult, width, true);
                }
            }
            (
                Layout::Gps,
                Value::Gps {
                    latitude,
                    longitude,
                    altitude,
                },
            ) => {
                write_int(&mut record, latitude * mult, 3, true);
                write_int(&mut record, longitude * mult, 3, true);
                write_int(&mut record, altitude * 100.0, 3, true);
            }
            (Layout::Colour, Value::Colour { r, g, b }) => {
                record.extend_from_slice(&[r, g, b]);
            }
            _ => return Err(unknown),
        }

        debug_assert_eq!(record.len(), ty.record_size());
        self.buffer.extend_from_slice(&record);
        Ok(())
    }
}

/// Write `value` rounded and saturated to a big-endian integer of `width` bytes.
fn write_int(out: &mut Vec<u8>, value: f64, width: usize, signed: bool) {
    let bits = (width * 8) as u32;
    let (min, max) = if signed {
        (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
    } else {
        (0, (1i64 << bits) - 1)
    };
    let v = if value.is_nan() {
        0
    } else {
        (value.round() as i64).clamp(min, max)
    };
    out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_wire_format() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::temperature(3, 27.2)]).unwrap();
        // 272 = 0x0110
        assert_eq!(enc.buffer(), &[0x03, 0x67, 0x01, 0x10]);
    }

    #[test]
    fn test_negative_temperature() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::temperature(1, -4.1)]).unwrap();
        // -41 = 0xFFD7
        assert_eq!(enc.buffer(), &[0x01, 0x67, 0xFF, 0xD7]);
    }

    #[test]
    fn test_gps_wire_format() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::gps(1, 42.3519, -87.9094, 10.0)])
            .unwrap();
        assert_eq!(
            enc.buffer(),
            &[0x01, 0x88, 0x06, 0x76, 0x5F, 0xF2, 0x96, 0x0A, 0x00, 0x03, 0xE8]
        );
    }

    #[test]
    fn test_generic_sensor_drops_fraction() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::generic(5, 1234.4)]).unwrap();
        assert_eq!(enc.buffer(), &[0x05, 0x64, 0x00, 0x00, 0x04, 0xD2]);
    }

    #[test]
    fn test_out_of_range_saturates() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::relative_humidity(1, 500.0)]).unwrap();
        assert_eq!(enc.buffer(), &[0x01, 0x68, 0xFF]);

        enc.encode(&[Sample::generic(1, -3.0)]).unwrap();
        assert_eq!(enc.buffer(), &[0x01, 0x64, 0, 0, 0, 0]);
    }

    #[test]
    fn test_overflow_leaves_buffer_empty() {
        let mut enc = PayloadEncoder::new(10);
        // 4 + 4 fits, the third record needs 12 bytes
        let result = enc.encode(&[
            Sample::temperature(1, 20.0),
            Sample::temperature(2, 21.0),
            Sample::temperature(3, 22.0),
        ]);
        assert_eq!(
            result,
            Err(EncodeError::Overflow {
                channel: 3,
                needed: 12,
                capacity: 10
            })
        );
        assert!(enc.is_empty());
    }

    #[test]
    fn test_exact_fit() {
        let mut enc = PayloadEncoder::new(8);
        let size = enc
            .encode(&[Sample::temperature(1, 20.0), Sample::temperature(2, 21.0)])
            .unwrap();
        assert_eq!(size, 8);
    }

    #[test]
    fn test_unknown_type_code() {
        let mut enc = PayloadEncoder::new(51);
        let result = enc.encode(&[
            Sample::temperature(1, 20.0),
            Sample::raw(9, 250, Value::Scalar(1.0)),
        ]);
        assert_eq!(result, Err(EncodeError::UnknownType { channel: 9, code: 250 }));
        assert!(enc.is_empty());
    }

    #[test]
    fn test_value_layout_mismatch_is_unknown_type() {
        let mut enc = PayloadEncoder::new(51);
        let result = enc.encode(&[Sample::new(4, LppType::Gps, Value::Scalar(1.0))]);
        assert_eq!(result, Err(EncodeError::UnknownType { channel: 4, code: 136 }));
    }

    #[test]
    fn test_buffer_reset_between_calls() {
        let mut enc = PayloadEncoder::new(51);
        enc.encode(&[Sample::temperature(1, 20.0), Sample::temperature(2, 20.0)])
            .unwrap();
        assert_eq!(enc.len(), 8);

        enc.encode(&[Sample::temperature(1, 20.0)]).unwrap();
        assert_eq!(enc.len(), 4);
    }

    #[test]
    fn test_empty_sample_list() {
        let mut enc = PayloadEncoder::new(51);
        assert_eq!(enc.encode(&[]), Ok(0));
        assert!(enc.is_empty());
    }
}
