//! Telemetry node binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin node` simulates a few wake cycles with
//!   simulated radio, sensors and GPS, persisting to `~/.tbeam-node/nvs.json`
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//!   arms the watchdog and halts: the SX1276 has no LoRaWAN MAC binding yet
//!
//! ## Environment
//!
//! - `TBEAM_NODE_CONFIG` - JSON file overriding [`NodeConfig`] fields (host)
//! - `TBEAM_NODE_CYCLES` - number of wake cycles to simulate (host, default 3)
//! - `TBEAM_NODE_REALTIME` - slow delays down to 1/N of real time (host)
//! - `TBEAM_NODE_DEV_EUI`, `TBEAM_NODE_APP_EUI`, `TBEAM_NODE_APP_KEY` - OTAA
//!   credentials as hex (host)

use log::{error, info};
use tbeam_node::config::NodeConfig;
#[cfg(not(feature = "esp32"))]
use tbeam_node::config::OtaaCredentials;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(not(feature = "esp32"))]
fn parse_credentials(
    dev_eui: Option<&str>,
    app_eui: Option<&str>,
    app_key: Option<&str>,
) -> OtaaCredentials {
    use log::warn;

    let (Some(dev_eui), Some(app_eui), Some(app_key)) = (dev_eui, app_eui, app_key) else {
        warn!("No OTAA credentials configured");
        return OtaaCredentials::default();
    };
    match OtaaCredentials::from_hex(dev_eui, app_eui, app_key) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Ignoring OTAA credentials: {}", e);
            OtaaCredentials::default()
        }
    }
}

#[cfg(feature = "esp32")]
fn main() {
    use tbeam_node::platform::{Esp32Platform, Platform};

    platform_init();
    info!("=== T-Beam telemetry node starting ===");

    let config = NodeConfig::default();
    let mut platform = match Esp32Platform::new(config.watchdog_timeout_ms, config.pins.button) {
        Ok(platform) => platform,
        Err(e) => {
            error!("Failed to configure watchdog: {}", e);
            return;
        }
    };

    // The SX1276 has no LoRaWAN MAC behind `Radio` yet. Stop before the
    // session machinery can write keys to NVS that no network knows about.
    platform.halt("no LoRaWAN MAC binding for the SX1276");
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use std::env;
    use std::fs;
    use std::process;
    use std::time::Duration;
    use tbeam_node::lora::SimulatedRadio;
    use tbeam_node::node::{Peripherals, TelemetryNode};
    use tbeam_node::persistence::{default_store_path, FileStore};
    use tbeam_node::platform::{HostPlatform, NoInput, Platform, SoftWatchdog};
    use tbeam_node::power::{RamRetained, TrackedRails};
    use tbeam_node::sensors::{
        Position, SimulatedAnemometer, SimulatedEnvironment, SimulatedGps, SimulatedParticulate,
        SimulatedPyranometer,
    };

    /// Where the simulated GPS finds itself.
    const SIM_POSITION: Position = Position {
        latitude: 52.090_737,
        longitude: 5.121_420,
        altitude: 8.5,
    };

    /// Polls until the simulated GPS has a fix (about 3 s at the default loop delay).
    const SIM_GPS_POLLS: u32 = 30;

    platform_init();
    info!("=== T-Beam telemetry node (host simulation) ===");

    let config = match env::var("TBEAM_NODE_CONFIG") {
        Ok(path) => {
            let loaded = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_json::from_str::<NodeConfig>(&text).map_err(|e| e.to_string())
                });
            match loaded {
                Ok(config) => {
                    info!("Configuration loaded from {}", path);
                    config
                }
                Err(e) => {
                    error!("Failed to load {}: {}", path, e);
                    process::exit(1);
                }
            }
        }
        Err(_) => NodeConfig::default(),
    };
    let credentials = parse_credentials(
        env::var("TBEAM_NODE_DEV_EUI").ok().as_deref(),
        env::var("TBEAM_NODE_APP_EUI").ok().as_deref(),
        env::var("TBEAM_NODE_APP_KEY").ok().as_deref(),
    );
    let wakes: u32 = env::var("TBEAM_NODE_CYCLES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);

    let store_path = match default_store_path() {
        Ok(path) => path,
        Err(e) => {
            error!("No place for the persistent store: {}", e);
            process::exit(1);
        }
    };
    info!("Persistent store: {:?}", store_path);

    let watchdog = SoftWatchdog::start(
        Duration::from_millis(config.watchdog_timeout_ms),
        || {
            error!("Watchdog expired, restarting");
            process::abort();
        },
    );
    let mut platform = HostPlatform::new().with_watchdog(watchdog);
    if let Some(divisor) = env::var("TBEAM_NODE_REALTIME")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        platform = platform.with_real_time(divisor);
    }

    let retained = RamRetained::new();
    let rails = TrackedRails::new();

    for wake in 1..=wakes {
        let store = match FileStore::at(&store_path) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open persistent store: {}", e);
                process::exit(1);
            }
        };

        // The SPS30 fields do not fit the default 51-byte payload.
        let peripherals = Peripherals {
            sensors: vec![
                Box::new(SimulatedEnvironment::new()),
                Box::new(SimulatedParticulate::new().absent()),
                Box::new(SimulatedPyranometer::new(612.0)),
                Box::new(SimulatedAnemometer::new(4.2)),
            ],
            gps: Some(Box::new(SimulatedGps::new(SIM_POSITION, SIM_GPS_POLLS))),
            rails: Box::new(rails.clone()),
            input: Box::new(NoInput),
            retained: Box::new(retained.clone()),
        };

        let mut node = match TelemetryNode::new(
            config.clone(),
            credentials.clone(),
            SimulatedRadio::new(),
            store,
            &mut platform,
            peripherals,
        ) {
            Ok(node) => node,
            Err(e) => {
                platform.halt(&e.to_string());
                process::exit(1);
            }
        };

        match node.boot().and_then(|()| node.run()) {
            Ok(slept_ms) => info!("Wake {}/{} done, slept {} s", wake, wakes, slept_ms / 1000),
            Err(e) => {
                node.platform_mut().halt(&e.to_string());
                process::exit(1);
            }
        }
    }

    info!("Simulation finished after {} wake cycles", wakes);
}
