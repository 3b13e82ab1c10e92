//! Cayenne LPP data types.
//!
//! Every record on the wire is `[channel:1][type:1][data:N]` where `N` and the
//! fixed-point multiplier depend only on the type code. Multi-byte fields are
//! big-endian.

/// Layout of a type's data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One integer of `width` bytes.
    Scalar { width: usize, signed: bool },
    /// Three signed integers of `width` bytes each (x, y, z).
    Vector { width: usize },
    /// Latitude and longitude (3 bytes, 1e-4 deg), altitude (3 bytes, 0.01 m).
    Gps,
    /// Three unsigned bytes (r, g, b).
    Colour,
}

/// Known Cayenne LPP types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LppType {
    DigitalInput = 0,
    DigitalOutput = 1,
    AnalogInput = 2,
    AnalogOutput = 3,
    GenericSensor = 100,
    Luminosity = 101,
    Presence = 102,
    Temperature = 103,
    RelativeHumidity = 104,
    Accelerometer = 113,
    BarometricPressure = 115,
    Voltage = 116,
    Current = 117,
    Frequency = 118,
    Percentage = 120,
    Altitude = 121,
    Concentration = 125,
    Power = 128,
    Distance = 130,
    Energy = 131,
    Direction = 132,
    UnixTime = 133,
    Gyrometer = 134,
    Colour = 135,
    Gps = 136,
    Switch = 142,
}

impl LppType {
    /// Look up a type by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        let ty = match code {
            0 => Self::DigitalInput,
            1 => Self::DigitalOutput,
            2 => Self::AnalogInput,
            3 => Self::AnalogOutput,
            100 => Self::GenericSensor,
            101 => Self::Luminosity,
            102 => Self::Presence,
            103 => Self::Temperature,
            104 => Self::RelativeHumidity,
            113 => Self::Accelerometer,
            115 => Self::BarometricPressure,
            116 => Self::Voltage,
            117 => Self::Current,
            118 => Self::Frequency,
            120 => Self::Percentage,
            121 => Self::Altitude,
            125 => Self::Concentration,
            128 => Self::Power,
            130 => Self::Distance,
            131 => Self::Energy,
            132 => Self::Direction,
            133 => Self::UnixTime,
            134 => Self::Gyrometer,
            135 => Self::Colour,
            136 => Self::Gps,
            142 => Self::Switch,
            _ => return None,
        };
        Some(ty)
    }

    /// Wire code of this type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Data field layout.
    pub fn layout(self) -> Layout {
        use Layout::{Scalar, Vector};
        match self {
            Self::DigitalInput
            | Self::DigitalOutput
            | Self::Presence
            | Self::RelativeHumidity
            | Self::Percentage
            | Self::Switch => Scalar {
                width: 1,
                signed: false,
            },
            Self::AnalogInput | Self::AnalogOutput | Self::Temperature | Self::Altitude => {
                Scalar {
                    width: 2,
                    signed: true,
                }
            }
            Self::Luminosity
            | Self::BarometricPressure
            | Self::Voltage
            | Self::Current
            | Self::Concentration
            | Self::Power
            | Self::Direction => Scalar {
                width: 2,
                signed: false,
            },
            Self::GenericSensor
            | Self::Frequency
            | Self::Distance
            | Self::Energy
            | Self::UnixTime => Scalar {
                width: 4,
                signed: false,
            },
            Self::Accelerometer | Self::Gyrometer => Vector { width: 2 },
            Self::Colour => Layout::Colour,
            Self::Gps => Layout::Gps,
        }
    }

    /// Fixed-point multiplier applied before truncation to an integer.
    ///
    /// For GPS this is the latitude/longitude multiplier; altitude uses 100.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::AnalogInput | Self::AnalogOutput | Self::Voltage | Self::Gyrometer => 100.0,
            Self::Temperature | Self::BarometricPressure => 10.0,
            Self::RelativeHumidity => 2.0,
            Self::Accelerometer | Self::Current | Self::Distance | Self::Energy => 1000.0,
            Self::Gps => 10_000.0,
            _ => 1.0,
        }
    }

    /// Size of the data field in bytes.
    pub fn data_size(self) -> usize {
        match self.layout() {
            Layout::Scalar { width, .. } => width,
            Layout::Vector { width } => width * 3,
            Layout::Gps => 9,
            Layout::Colour => 3,
        }
    }

    /// Size of a full record (channel + type + data).
    pub fn record_size(self) -> usize {
        2 + self.data_size()
    }
}
