//! Maps sensor readings to payload samples.
//!
//! Field order on the wire is fixed: position, wind speed, irradiance,
//! particulate matter, then the environment sensor. Fields of sensors that
//! were not sampled are simply absent.

use crate::config::ChannelMap;
use crate::lpp::Sample;
use crate::sensors::{EnvironmentReading, ParticulateReading, Position, Reading};
use log::info;

/// Build the ordered sample list for one uplink.
pub fn pack(position: &Position, readings: &[Reading], channels: &ChannelMap) -> Vec<Sample> {
    info!(
        "GPS: lat {:.6}, long {:.6}, alt {:.2} m",
        position.latitude, position.longitude, position.altitude
    );
    let mut samples = vec![Sample::gps(
        channels.gps,
        position.latitude,
        position.longitude,
        position.altitude,
    )];

    for reading in readings {
        if let Reading::WindSpeed(speed) = reading {
            info!("Anemometer: {:.2} m/s", speed);
            samples.push(Sample::generic(channels.wind_speed, *speed as f64));
        }
    }

    for reading in readings {
        if let Reading::Irradiance(irradiance) = reading {
            info!("Pyranometer: {:.2} W/m^2", irradiance);
            samples.push(Sample::generic(channels.irradiance, *irradiance as f64));
        }
    }

    for reading in readings {
        if let Reading::Particulate(pm) = reading {
            pack_particulate(pm, channels, &mut samples);
        }
    }

    for reading in readings {
        if let Reading::Environment(env) = reading {
            pack_environment(env, channels, &mut samples);
        }
    }

    samples
}

fn pack_particulate(pm: &ParticulateReading, channels: &ChannelMap, out: &mut Vec<Sample>) {
    info!(
        "SPS30: PM1 {:.3}, PM2.5 {:.3}, PM4 {:.3}, PM10 {:.3} ug/m^3, size {:.3} um",
        pm.mass_pm1, pm.mass_pm2_5, pm.mass_pm4, pm.mass_pm10, pm.typical_size
    );
    let fields = [
        (channels.pm1_mass, pm.mass_pm1),
        (channels.pm2_5_mass, pm.mass_pm2_5),
        (channels.pm4_mass, pm.mass_pm4),
        (channels.pm10_mass, pm.mass_pm10),
        (channels.pm0_5_count, pm.count_pm0_5),
        (channels.pm1_count, pm.count_pm1),
        (channels.pm2_5_count, pm.count_pm2_5),
        (channels.pm4_count, pm.count_pm4),
        (channels.pm10_count, pm.count_pm10),
        (channels.particle_size, pm.typical_size),
    ];
    out.extend(
        fields
            .iter()
            .map(|&(channel, value)| Sample::generic(channel, value as f64)),
    );
}

fn pack_environment(env: &EnvironmentReading, channels: &ChannelMap, out: &mut Vec<Sample>) {
    info!(
        "BME680: {:.2} degC (avg {:.2}), {:.2} hPa, {:.2} kOhm, {:.2} %, {:.2} m",
        env.temperature,
        env.average_temperature,
        env.pressure_hpa,
        env.gas_kohm,
        env.humidity,
        env.altitude
    );
    out.push(Sample::temperature(channels.temperature, env.temperature as f64));
    out.push(Sample::temperature(
        channels.average_temperature,
        env.average_temperature as f64,
    ));
    out.push(Sample::barometric_pressure(
        channels.pressure,
        env.pressure_hpa as f64,
    ));
    out.push(Sample::generic(channels.gas_resistance, env.gas_kohm as f64));
    out.push(Sample::relative_humidity(channels.humidity, env.humidity as f64));
    out.push(Sample::altitude(channels.baro_altitude, env.altitude as f64));
}
