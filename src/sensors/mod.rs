//! Sensor and GPS capabilities.
//!
//! Drivers are external; the node only sees [`Sensor`] and [`Gps`]. Which
//! sensors are fitted is decided once at boot by [`SensorSuite::detect`]. A
//! missing sensor is not an error, its fields are simply left out of the
//! payload.

mod sim;

pub use sim::{
    SimulatedAnemometer, SimulatedEnvironment, SimulatedGps, SimulatedParticulate,
    SimulatedPyranometer,
};

use log::{debug, info, warn};

/// A geographic position. Altitude in metres above sea level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// BME680-class reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentReading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Running average since power-up, degrees Celsius.
    pub average_temperature: f32,
    /// Hectopascal.
    pub pressure_hpa: f32,
    /// Gas resistance, kilo-ohm.
    pub gas_kohm: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
    /// Barometric altitude, metres.
    pub altitude: f32,
}

/// SPS30-class reading. Mass in ug/m3, number concentration in #/cm3,
/// typical particle size in um.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParticulateReading {
    pub mass_pm1: f32,
    pub mass_pm2_5: f32,
    pub mass_pm4: f32,
    pub mass_pm10: f32,
    pub count_pm0_5: f32,
    pub count_pm1: f32,
    pub count_pm2_5: f32,
    pub count_pm4: f32,
    pub count_pm10: f32,
    pub typical_size: f32,
}

/// A calibrated reading from one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Environment(EnvironmentReading),
    Particulate(ParticulateReading),
    /// Solar irradiance, W/m2.
    Irradiance(f32),
    /// Wind speed, m/s.
    WindSpeed(f32),
}

/// A sensor driver.
pub trait Sensor {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Probe the bus. Called once at boot.
    fn detect(&mut self) -> bool;

    /// Take one measurement. `None` means the reading is not valid yet.
    fn sample(&mut self) -> Option<Reading>;
}

/// A GPS receiver.
pub trait Gps {
    /// Feed pending NMEA data to the parser.
    fn poll(&mut self);

    /// Current position, if the receiver has a valid fix.
    fn fix(&self) -> Option<Position>;
}

/// The sensors found at boot.
pub struct SensorSuite {
    sensors: Vec<Box<dyn Sensor>>,
}

impl SensorSuite {
    /// Probe every candidate and keep the ones that answer.
    pub fn detect(candidates: Vec<Box<dyn Sensor>>) -> Self {
        let mut sensors = Vec::with_capacity(candidates.len());
        for mut sensor in candidates {
            let present = sensor.detect();
            debug!("has_{} = {}", sensor.name(), present);
            if present {
                sensors.push(sensor);
            }
        }
        info!("{} sensor(s) detected", sensors.len());
        Self { sensors }
    }

    pub fn empty() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Names of the detected sensors.
    pub fn names(&self) -> Vec<&'static str> {
        self.sensors.iter().map(|s| s.name()).collect()
    }

    /// Sample every sensor, retrying invalid readings.
    ///
    /// Each sensor gets up to `attempts` tries; `wait` runs between tries and
    /// must keep the radio and watchdog serviced. A sensor that never yields
    /// a valid reading is left out.
    pub fn sample_all(&mut self, attempts: u32, mut wait: impl FnMut()) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.sensors.len());
        for sensor in &mut self.sensors {
            let mut reading = None;
            for attempt in 0..attempts.max(1) {
                if attempt > 0 {
                    wait();
                }
                reading = sensor.sample();
                if reading.is_some() {
                    break;
                }
                debug!("{}: invalid reading (attempt {})", sensor.name(), attempt + 1);
            }
            match reading {
                Some(r) => readings.push(r),
                None => warn!(
                    "{}: no valid reading after {} attempts, omitted",
                    sensor.name(),
                    attempts
                ),
            }
        }
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_keeps_present_only() {
        let suite = SensorSuite::detect(vec![
            Box::new(SimulatedEnvironment::new()),
            Box::new(SimulatedParticulate::new().absent()),
            Box::new(SimulatedPyranometer::new(420.0)),
        ]);
        assert_eq!(suite.names(), vec!["bme680", "lppyra03av"]);
    }

    #[test]
    fn test_invalid_reading_retried() {
        let mut suite =
            SensorSuite::detect(vec![Box::new(SimulatedEnvironment::new().invalid_for(2))]);
        let mut waits = 0;
        let readings = suite.sample_all(5, || waits += 1);

        assert_eq!(readings.len(), 1);
        assert_eq!(waits, 2);
        assert!(matches!(readings[0], Reading::Environment(_)));
    }

    #[test]
    fn test_never_valid_reading_omitted() {
        let mut suite = SensorSuite::detect(vec![
            Box::new(SimulatedEnvironment::new().invalid_for(u32::MAX)),
            Box::new(SimulatedAnemometer::new(3.5)),
        ]);
        let mut waits = 0;
        let readings = suite.sample_all(3, || waits += 1);

        assert_eq!(readings, vec![Reading::WindSpeed(3.5)]);
        assert_eq!(waits, 2);
    }

    #[test]
    fn test_empty_suite() {
        let mut suite = SensorSuite::empty();
        assert!(suite.is_empty());
        assert!(suite.sample_all(3, || {}).is_empty());
    }
}
