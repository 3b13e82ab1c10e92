//! Reference Cayenne LPP decoder.
//!
//! Mirrors what the network-side payload formatter does. The node itself
//! never decodes uplinks; this is used to log what the network will see and
//! to check the encoder.

use super::encoder::{Sample, Value};
use super::types::{Layout, LppType};
use std::fmt;

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends inside a record.
    Truncated { offset: usize },
    /// A record carries a type code this decoder does not know.
    UnknownType { offset: usize, code: u8 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset } => write!(f, "truncated record at offset {}", offset),
            Self::UnknownType { offset, code } => {
                write!(f, "unknown type {} at offset {}", code, offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a full payload into samples, in wire order.
pub fn decode(bytes: &[u8]) -> Result<Vec<Sample>, DecodeError> {
    let mut samples = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if offset + 2 > bytes.len() {
            return Err(DecodeError::Truncated { offset });
        }
        let channel = bytes[offset];
        let code = bytes[offset + 1];
        let ty = LppType::from_code(code).ok_or(DecodeError::UnknownType { offset, code })?;

        let end = offset + ty.record_size();
        if end > bytes.len() {
            return Err(DecodeError::Truncated { offset });
        }
        let data = &bytes[offset + 2..end];
        let mult = ty.multiplier();

        let value = match ty.layout() {
            Layout::Scalar { width, signed } => {
                Value::Scalar(read_int(&data[..width], signed) as f64 / mult)
            }
            Layout::Vector { width } => Value::Vector {
                x: read_int(&data[..width], true) as f64 / mult,
                y: read_int(&data[width..width * 2], true) as f64 / mult,
                z: read_int(&data[width * 2..width * 3], true) as f64 / mult,
            },
            Layout::Gps => Value::Gps {
                latitude: read_int(&data[0..3], true) as f64 / mult,
                longitude: read_int(&data[3..6], true) as f64 / mult,
                altitude: read_int(&data[6..9], true) as f64 / 100.0,
            },
            Layout::Colour => Value::Colour {
                r: data[0],
                g: data[1],
                b: data[2],
            },
        };

        samples.push(Sample::new(channel, ty, value));
        offset = end;
    }

    Ok(samples)
}

/// Read a big-endian integer, sign-extending when `signed`.
fn read_int(bytes: &[u8], signed: bool) -> i64 {
    let mut v: i64 = 0;
    for &b in bytes {
        v = (v << 8) | b as i64;
    }
    let bits = bytes.len() * 8;
    if signed && bits < 64 && v & (1 << (bits - 1)) != 0 {
        v -= 1 << bits;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::super::PayloadEncoder;
    use super::*;

    #[test]
    fn test_encode_decode_preserves_order_and_values() {
        let samples = vec![
            Sample::gps(1, 43.6195, 12.6733, 212.4),
            Sample::generic(2, 7.0),
            Sample::temperature(20, -12.5),
            Sample::barometric_pressure(22, 1013.2),
            Sample::relative_humidity(24, 55.5),
            Sample::altitude(25, -30.0),
            Sample::new(
                30,
                LppType::Accelerometer,
                Value::Vector {
                    x: 0.125,
                    y: -1.0,
                    z: 9.75,
                },
            ),
            Sample::new(31, LppType::Colour, Value::Colour { r: 1, g: 2, b: 3 }),
        ];

        let mut enc = PayloadEncoder::new(64);
        enc.encode(&samples).unwrap();

        let decoded = decode(enc.buffer()).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_decode_known_vector() {
        // Two temperature records from the LPP reference documentation
        let bytes = [0x03, 0x67, 0x01, 0x10, 0x05, 0x67, 0x00, 0xFF];
        let decoded = decode(&bytes).unwrap();
        assert_eq!(
            decoded,
            vec![Sample::temperature(3, 27.2), Sample::temperature(5, 25.5)]
        );
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = [0x03, 0x67, 0x01];
        assert_eq!(decode(&bytes), Err(DecodeError::Truncated { offset: 0 }));

        let bytes = [0x03, 0x67, 0x01, 0x10, 0x05];
        assert_eq!(decode(&bytes), Err(DecodeError::Truncated { offset: 4 }));
    }

    #[test]
    fn test_decode_unknown_type() {
        let bytes = [0x01, 0xFA, 0x00];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownType {
                offset: 0,
                code: 0xFA
            })
        );
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[]), Ok(vec![]));
    }

    #[test]
    fn test_read_int_sign_extension() {
        assert_eq!(read_int(&[0xFF, 0xD7], true), -41);
        assert_eq!(read_int(&[0xFF, 0xD7], false), 0xFFD7);
        assert_eq!(read_int(&[0xF2, 0x96, 0x0A], true), -879_094);
    }
}
