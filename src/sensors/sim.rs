//! Simulated sensors and GPS for host runs and tests.
//!
//! Readings drift slowly with every sample so consecutive uplinks differ.

use super::{EnvironmentReading, Gps, ParticulateReading, Position, Reading, Sensor};

/// BME680 stand-in.
#[derive(Debug, Clone)]
pub struct SimulatedEnvironment {
    present: bool,
    invalid_for: u32,
    samples: u32,
    base: EnvironmentReading,
    temperature_sum: f32,
}

impl Default for SimulatedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEnvironment {
    pub fn new() -> Self {
        Self {
            present: true,
            invalid_for: 0,
            samples: 0,
            base: EnvironmentReading {
                temperature: 21.5,
                average_temperature: 21.5,
                pressure_hpa: 1013.2,
                gas_kohm: 48.0,
                humidity: 55.0,
                altitude: 212.0,
            },
            temperature_sum: 0.0,
        }
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    /// Report the first `samples` readings as invalid.
    pub fn invalid_for(mut self, samples: u32) -> Self {
        self.invalid_for = samples;
        self
    }
}

impl Sensor for SimulatedEnvironment {
    fn name(&self) -> &'static str {
        "bme680"
    }

    fn detect(&mut self) -> bool {
        self.present
    }

    fn sample(&mut self) -> Option<Reading> {
        if self.invalid_for > 0 {
            self.invalid_for -= 1;
            return None;
        }
        self.samples += 1;
        let step = (self.samples % 10) as f32;
        let temperature = self.base.temperature + step * 0.1;
        self.temperature_sum += temperature;
        Some(Reading::Environment(EnvironmentReading {
            temperature,
            average_temperature: self.temperature_sum / self.samples as f32,
            pressure_hpa: self.base.pressure_hpa - step * 0.2,
            gas_kohm: self.base.gas_kohm + step,
            humidity: self.base.humidity + step * 0.5,
            altitude: self.base.altitude,
        }))
    }
}

/// SPS30 stand-in.
#[derive(Debug, Clone)]
pub struct SimulatedParticulate {
    present: bool,
    samples: u32,
}

impl Default for SimulatedParticulate {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedParticulate {
    pub fn new() -> Self {
        Self {
            present: true,
            samples: 0,
        }
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }
}

impl Sensor for SimulatedParticulate {
    fn name(&self) -> &'static str {
        "sps30"
    }

    fn detect(&mut self) -> bool {
        self.present
    }

    fn sample(&mut self) -> Option<Reading> {
        self.samples += 1;
        let k = 1.0 + (self.samples % 5) as f32 * 0.05;
        Some(Reading::Particulate(ParticulateReading {
            mass_pm1: 4.2 * k,
            mass_pm2_5: 6.1 * k,
            mass_pm4: 7.3 * k,
            mass_pm10: 8.0 * k,
            count_pm0_5: 28.0 * k,
            count_pm1: 33.5 * k,
            count_pm2_5: 34.6 * k,
            count_pm4: 34.8 * k,
            count_pm10: 34.9 * k,
            typical_size: 0.6,
        }))
    }
}

/// LPPYRA03AV pyranometer stand-in.
#[derive(Debug, Clone)]
pub struct SimulatedPyranometer {
    present: bool,
    irradiance: f32,
}

impl SimulatedPyranometer {
    pub fn new(irradiance: f32) -> Self {
        Self {
            present: true,
            irradiance,
        }
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }
}

impl Sensor for SimulatedPyranometer {
    fn name(&self) -> &'static str {
        "lppyra03av"
    }

    fn detect(&mut self) -> bool {
        self.present
    }

    fn sample(&mut self) -> Option<Reading> {
        Some(Reading::Irradiance(self.irradiance))
    }
}

/// SEN0170 anemometer stand-in.
#[derive(Debug, Clone)]
pub struct SimulatedAnemometer {
    present: bool,
    wind_speed: f32,
}

impl SimulatedAnemometer {
    pub fn new(wind_speed: f32) -> Self {
        Self {
            present: true,
            wind_speed,
        }
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }
}

impl Sensor for SimulatedAnemometer {
    fn name(&self) -> &'static str {
        "sen0170"
    }

    fn detect(&mut self) -> bool {
        self.present
    }

    fn sample(&mut self) -> Option<Reading> {
        Some(Reading::WindSpeed(self.wind_speed))
    }
}

/// GPS stand-in that acquires a fix after a number of polls.
#[derive(Debug, Clone)]
pub struct SimulatedGps {
    position: Position,
    fix_after: Option<u32>,
    polls: u32,
}

impl SimulatedGps {
    /// Fix at `position` after `polls` calls to [`Gps::poll`].
    pub fn new(position: Position, polls: u32) -> Self {
        Self {
            position,
            fix_after: Some(polls),
            polls: 0,
        }
    }

    /// A receiver that never gets a fix (indoors, antenna unplugged).
    pub fn without_fix() -> Self {
        Self {
            position: Position::default(),
            fix_after: None,
            polls: 0,
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }
}

impl Gps for SimulatedGps {
    fn poll(&mut self) {
        self.polls = self.polls.saturating_add(1);
    }

    fn fix(&self) -> Option<Position> {
        match self.fix_after {
            Some(after) if self.polls >= after => Some(self.position),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_average_tracks_samples() {
        let mut env = SimulatedEnvironment::new();
        let first = env.sample();
        let second = env.sample();
        let (Some(Reading::Environment(a)), Some(Reading::Environment(b))) = (first, second)
        else {
            panic!("expected environment readings");
        };
        assert_eq!(a.average_temperature, a.temperature);
        assert!((b.average_temperature - (a.temperature + b.temperature) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_gps_fix_after_polls() {
        let mut gps = SimulatedGps::new(Position::new(43.6, 12.6, 200.0), 3);
        for _ in 0..2 {
            gps.poll();
            assert!(gps.fix().is_none());
        }
        gps.poll();
        assert_eq!(gps.fix(), Some(Position::new(43.6, 12.6, 200.0)));
    }

    #[test]
    fn test_gps_without_fix() {
        let mut gps = SimulatedGps::without_fix();
        for _ in 0..1000 {
            gps.poll();
        }
        assert!(gps.fix().is_none());
    }
}
