//! The duty-cycle loop of the telemetry node.
//!
//! One boot of the device is one [`TelemetryNode`]: power up the rails, bring
//! up the radio, restore or join the network session, sample the sensors,
//! encode and queue one uplink, wait for it to complete, then deep sleep for
//! the rest of the send interval. The next wake is a fresh boot.
//!
//! ```text
//! Idle -> Sampling -> Encoding -> Transmitting -> (tx complete) -> Sleeping
//!   ^         |
//!   +---------+  no GPS fix yet
//! ```
//!
//! All waits are cooperative: they keep polling the radio and feeding the
//! watchdog. The watchdog is only starved when an uplink stays pending for
//! longer than its timeout, which restarts the device.
//!
//! # Example
//!
//! ```
//! use tbeam_node::config::{NodeConfig, OtaaCredentials};
//! use tbeam_node::lora::SimulatedRadio;
//! use tbeam_node::node::{Peripherals, TelemetryNode};
//! use tbeam_node::persistence::MemoryStore;
//! use tbeam_node::platform::{HostPlatform, NoInput};
//! use tbeam_node::power::{RamRetained, TrackedRails};
//! use tbeam_node::sensors::{Position, SimulatedEnvironment, SimulatedGps};
//!
//! let mut platform = HostPlatform::new();
//! let peripherals = Peripherals {
//!     sensors: vec![Box::new(SimulatedEnvironment::new())],
//!     gps: Some(Box::new(SimulatedGps::new(Position::new(52.1, 4.3, 12.0), 3))),
//!     rails: Box::new(TrackedRails::new()),
//!     input: Box::new(NoInput),
//!     retained: Box::new(RamRetained::new()),
//! };
//! let mut node = TelemetryNode::new(
//!     NodeConfig::default(),
//!     OtaaCredentials::default(),
//!     SimulatedRadio::new(),
//!     MemoryStore::new(),
//!     &mut platform,
//!     peripherals,
//! )
//! .unwrap();
//!
//! node.boot().unwrap();
//! let slept_ms = node.run().unwrap();
//! assert!(slept_ms < 60_000);
//! ```

use crate::config::{ConfigError, NodeConfig, OtaaCredentials};
use crate::lora::{
    EventSink, Radio, RadioError, RadioEvent, RadioSession, SessionEvent, TransmissionOutcome,
    TransmissionRequest, UplinkCounter,
};
use crate::lpp::{self, EncodeError, PayloadEncoder};
use crate::packer;
use crate::persistence::PersistenceStore;
use crate::platform::{Platform, UserInput, UserRequest};
use crate::power::{
    self, compute_sleep_ms, PowerRails, Rail, RetainedMemory, RetainedState, WakeCause,
};
use crate::sensors::{Gps, Position, Sensor, SensorSuite};
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Error type for the duty-cycle loop. Every variant is fatal: the device
/// should halt with a diagnostic rather than retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The configuration does not validate.
    Config(ConfigError),
    /// The radio did not come up.
    RadioInit(RadioError),
    /// The payload does not fit the configured buffer.
    Encode(EncodeError),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Config(e) => write!(f, "configuration error: {}", e),
            NodeError::RadioInit(e) => write!(f, "radio init failed: {}", e),
            NodeError::Encode(e) => write!(f, "payload encoding failed: {}", e),
        }
    }
}

impl std::error::Error for NodeError {}

/// Where the loop currently is in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Encoding,
    Transmitting,
    Sleeping,
}

/// Primary session callback: tracks the uplink of the current cycle.
///
/// `sent` is only raised for a transmission-complete event that follows a
/// queued uplink, so stray completions never send the node to sleep.
#[derive(Debug, Default)]
pub struct TxTracker {
    queued: Cell<bool>,
    sent: Cell<bool>,
    acknowledged: Cell<bool>,
    last_outcome: Cell<Option<TransmissionOutcome>>,
}

impl TxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// An uplink was queued and has not completed yet.
    pub fn is_queued(&self) -> bool {
        self.queued.get()
    }

    /// Consume the packet-sent flag.
    pub fn take_sent(&self) -> bool {
        self.sent.replace(false)
    }

    /// The last completed uplink was acknowledged.
    pub fn acknowledged(&self) -> bool {
        self.acknowledged.get()
    }

    pub fn last_outcome(&self) -> Option<TransmissionOutcome> {
        self.last_outcome.get()
    }

    fn clear(&self) {
        self.queued.set(false);
        self.sent.set(false);
    }
}

impl EventSink for TxTracker {
    fn notify(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Outcome(outcome) => {
                match outcome {
                    TransmissionOutcome::Queued => {
                        self.queued.set(true);
                        self.acknowledged.set(false);
                    }
                    TransmissionOutcome::Acknowledged => {
                        info!("Transmission acknowledged");
                        self.acknowledged.set(true);
                    }
                    TransmissionOutcome::ResponseReceived => info!("Downlink received"),
                    TransmissionOutcome::RejectedPending | TransmissionOutcome::Failed => {}
                }
                self.last_outcome.set(Some(*outcome));
            }
            SessionEvent::Radio(RadioEvent::TxComplete { .. }) if self.queued.get() => {
                debug!("Packet sent");
                self.queued.set(false);
                self.sent.set(true);
            }
            SessionEvent::Joined { restored } => {
                info!("Joined ({})", if *restored { "restored" } else { "OTAA" });
            }
            SessionEvent::Radio(_) => {}
        }
    }
}

/// Board peripherals handed to the node at boot.
pub struct Peripherals {
    /// Candidate sensors; probed once the sensor rail is up.
    pub sensors: Vec<Box<dyn Sensor>>,
    pub gps: Option<Box<dyn Gps>>,
    pub rails: Box<dyn PowerRails>,
    pub input: Box<dyn UserInput>,
    pub retained: Box<dyn RetainedMemory>,
}

enum CycleResult {
    /// A GPS position is wanted and there is no valid fix yet.
    WaitingForFix,
    /// An uplink was handed to the session, whatever the outcome.
    Attempted(TransmissionOutcome),
}

/// One boot of the telemetry node.
pub struct TelemetryNode<R: Radio, S: PersistenceStore, P: Platform> {
    config: NodeConfig,
    credentials: OtaaCredentials,
    session: RadioSession<R, S>,
    platform: P,
    rails: Box<dyn PowerRails>,
    candidates: Vec<Box<dyn Sensor>>,
    sensors: SensorSuite,
    gps: Option<Box<dyn Gps>>,
    input: Box<dyn UserInput>,
    memory: Box<dyn RetainedMemory>,
    retained: RetainedState,
    tracker: Rc<TxTracker>,
    encoder: PayloadEncoder,
    phase: Phase,
    last_cycle_ms: Option<u64>,
    queued_at_ms: Option<u64>,
    gps_wait_logged: bool,
    stall_logged: bool,
}

impl<R: Radio, S: PersistenceStore, P: Platform> TelemetryNode<R, S, P> {
    /// Validate the configuration and run the boot bookkeeping of retained
    /// memory. Nothing is powered up yet; see [`TelemetryNode::boot`].
    pub fn new(
        config: NodeConfig,
        credentials: OtaaCredentials,
        radio: R,
        mut store: S,
        platform: P,
        mut peripherals: Peripherals,
    ) -> Result<Self, NodeError> {
        config.validate().map_err(NodeError::Config)?;

        let mut retained = power::boot(peripherals.retained.as_mut());
        let wake_cause = platform.wake_cause();
        info!("Boot #{} ({:?})", retained.boot_count, wake_cause);
        if wake_cause == WakeCause::Button {
            info!("Woken by button, GPS position requested");
            retained.want_gps = true;
        }

        let counter = UplinkCounter::seed(
            retained.uplink_sequence,
            &mut store,
            config.counter_flush_interval_ms,
        );
        let tracker = Rc::new(TxTracker::new());
        let session = RadioSession::new(radio, store, counter, &config, tracker.clone());

        Ok(Self {
            encoder: PayloadEncoder::new(config.max_payload),
            config,
            credentials,
            session,
            platform,
            rails: peripherals.rails,
            candidates: peripherals.sensors,
            sensors: SensorSuite::empty(),
            gps: peripherals.gps,
            input: peripherals.input,
            memory: peripherals.retained,
            retained,
            tracker,
            phase: Phase::Idle,
            last_cycle_ms: None,
            queued_at_ms: None,
            gps_wait_logged: false,
            stall_logged: false,
        })
    }

    /// Power up, probe sensors, bring up the radio and start the join.
    ///
    /// A radio that does not come up is fatal.
    pub fn boot(&mut self) -> Result<(), NodeError> {
        self.rails.enable_rail(Rail::Lora);
        self.rails.enable_rail(Rail::Sensors);
        if self.retained.want_gps {
            self.rails.enable_rail(Rail::Gps);
        }

        self.sensors = SensorSuite::detect(std::mem::take(&mut self.candidates));

        if self.credentials.is_placeholder() {
            warn!("OTAA credentials are placeholders, the join will not be accepted");
        }
        self.session
            .radio_mut()
            .initialize(&self.config.pins, &self.credentials)
            .map_err(NodeError::RadioInit)?;
        self.session.join();
        Ok(())
    }

    /// Run until the node goes to sleep. Returns the sleep duration.
    ///
    /// On hardware the sleep never returns; the next wake is a new boot.
    pub fn run(&mut self) -> Result<u64, NodeError> {
        loop {
            if let Some(slept_ms) = self.step()? {
                return Ok(slept_ms);
            }
        }
    }

    /// One iteration of the main loop. Returns the sleep duration once the
    /// node has gone to sleep.
    pub fn step(&mut self) -> Result<Option<u64>, NodeError> {
        self.session.poll();
        let now = self.platform.millis();
        self.service_watchdog(now);

        if self.tracker.take_sent() {
            self.queued_at_ms = None;
            return Ok(Some(self.sleep()));
        }

        if let Some(request) = self.input.poll(now) {
            self.on_user_request(request);
        }

        if self.retained.want_gps {
            if let Some(gps) = self.gps.as_mut() {
                gps.poll();
            }
        }

        if self.cycle_due(now) {
            match self.sample_and_send(now)? {
                CycleResult::Attempted(outcome) => {
                    debug!("Cycle finished: {:?}", outcome);
                    self.last_cycle_ms = Some(now);
                    if outcome == TransmissionOutcome::Queued {
                        self.queued_at_ms = Some(now);
                    }
                }
                CycleResult::WaitingForFix => {
                    if let Some(limit) = self.config.gps_wait_for_lock_ms {
                        if now > limit {
                            warn!("No GPS lock after {} s, sleeping", limit / 1000);
                            return Ok(Some(self.sleep()));
                        }
                    }
                }
            }
        }

        self.platform.delay_ms(self.config.loop_delay_ms);
        Ok(None)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retained(&self) -> &RetainedState {
        &self.retained
    }

    pub fn tracker(&self) -> &TxTracker {
        &self.tracker
    }

    pub fn session(&self) -> &RadioSession<R, S> {
        &self.session
    }

    pub fn radio(&self) -> &R {
        self.session.radio()
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn cycle_due(&self, now: u64) -> bool {
        if !self.session.is_joined() || self.session.is_pending() || self.tracker.is_queued() {
            return false;
        }
        match self.last_cycle_ms {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.send_interval_ms,
        }
    }

    // Feed the watchdog unless an uplink has been pending for longer than
    // the watchdog timeout.
    fn service_watchdog(&mut self, now: u64) {
        let stalled = self
            .queued_at_ms
            .is_some_and(|at| now.saturating_sub(at) > self.config.watchdog_timeout_ms);
        if stalled {
            if !self.stall_logged {
                error!("Uplink stuck in flight, letting the watchdog expire");
                self.stall_logged = true;
            }
            return;
        }
        self.platform.feed_watchdog();
    }

    fn on_user_request(&mut self, request: UserRequest) {
        match request {
            UserRequest::SendPosition => {
                info!("Button: GPS position requested");
                self.retained.want_gps = true;
                self.rails.enable_rail(Rail::Gps);
                if !self.tracker.is_queued() {
                    self.last_cycle_ms = None;
                }
            }
            UserRequest::ResetSession => {
                info!("Button: forgetting session");
                self.tracker.clear();
                self.queued_at_ms = None;
                self.last_cycle_ms = None;
                self.session.reset();
            }
        }
    }

    fn sample_and_send(&mut self, now: u64) -> Result<CycleResult, NodeError> {
        self.phase = Phase::Sampling;
        let position = if self.retained.want_gps {
            match self.acquire_position() {
                Some(position) => position,
                None => {
                    self.phase = Phase::Idle;
                    return Ok(CycleResult::WaitingForFix);
                }
            }
        } else {
            self.retained
                .last_position
                .unwrap_or(self.config.default_position)
        };

        let attempts = self.config.sensor_retry_limit;
        let retry_delay = self.config.sensor_retry_delay_ms;
        let step_ms = self.config.loop_delay_ms;
        let platform = &mut self.platform;
        let session = &mut self.session;
        let readings = self.sensors.sample_all(attempts, || {
            cooperative_wait(platform, session, retry_delay, step_ms)
        });

        self.phase = Phase::Encoding;
        let samples = packer::pack(&position, &readings, &self.config.channels);
        let size = self.encoder.encode(&samples).map_err(NodeError::Encode)?;
        match lpp::decode(self.encoder.buffer()) {
            Ok(decoded) => debug!("Payload: {} B, {} field(s)", size, decoded.len()),
            Err(e) => warn!("Payload does not decode: {}", e),
        }

        self.phase = Phase::Transmitting;
        let request = TransmissionRequest::new(
            self.encoder.buffer().to_vec(),
            self.config.lorawan_port,
            self.config.confirmed_uplinks,
        );
        let outcome = self.session.send(request, now);
        match outcome {
            TransmissionOutcome::Queued => {
                info!("Uplink queued ({} B)", size);
                if self.retained.want_gps {
                    self.retained.want_gps = false;
                    self.gps_wait_logged = false;
                }
            }
            TransmissionOutcome::RejectedPending => warn!("Uplink rejected, previous one pending"),
            other => warn!("Uplink not queued: {:?}", other),
        }
        self.phase = Phase::Idle;
        Ok(CycleResult::Attempted(outcome))
    }

    // First valid fix, refined by further reads; remembered for later cycles.
    fn acquire_position(&mut self) -> Option<Position> {
        let Some(gps) = self.gps.as_mut() else {
            warn!("GPS position wanted but no receiver fitted");
            self.retained.want_gps = false;
            return Some(
                self.retained
                    .last_position
                    .unwrap_or(self.config.default_position),
            );
        };

        let Some(mut position) = gps.fix() else {
            if !self.gps_wait_logged {
                info!("Waiting for GPS lock...");
                self.gps_wait_logged = true;
            }
            return None;
        };

        debug!(
            "GPS lock, refining over {} samples",
            self.config.gps_refine_samples
        );
        for _ in 0..self.config.gps_refine_samples {
            cooperative_wait(
                &mut self.platform,
                &mut self.session,
                self.config.gps_refine_interval_ms,
                self.config.loop_delay_ms,
            );
            gps.poll();
            if let Some(fix) = gps.fix() {
                position = fix;
            }
        }

        self.retained.last_position = Some(position);
        Some(position)
    }

    fn sleep(&mut self) -> u64 {
        self.phase = Phase::Sleeping;
        self.session.shutdown();
        self.rails.disable_rail(Rail::Lora);
        self.rails.disable_rail(Rail::Sensors);
        // Keep the GPS powered while a fix is still wanted so it keeps its almanac.
        if !self.retained.want_gps {
            self.rails.disable_rail(Rail::Gps);
        }

        self.retained.uplink_sequence = self.session.counter().value();
        self.memory.store(&self.retained);

        let sleep_ms = compute_sleep_ms(self.config.send_interval_ms, self.platform.millis());
        self.platform.deep_sleep(sleep_ms, true);
        sleep_ms
    }
}

// Wait `ms` while keeping the radio and the watchdog serviced.
fn cooperative_wait<R: Radio, S: PersistenceStore, P: Platform>(
    platform: &mut P,
    session: &mut RadioSession<R, S>,
    ms: u64,
    step_ms: u64,
) {
    let deadline = platform.millis().saturating_add(ms);
    loop {
        session.poll();
        platform.feed_watchdog();
        let now = platform.millis();
        if now >= deadline {
            break;
        }
        platform.delay_ms(step_ms.max(1).min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::session::{Session, KEY_COUNT, NAMESPACE};
    use crate::lora::SimulatedRadio;
    use crate::persistence::{MemoryStore, Namespace};
    use crate::platform::{HostPlatform, NoInput, ScriptedInput};
    use crate::power::{RamRetained, TrackedRails};
    use crate::sensors::{
        SimulatedAnemometer, SimulatedEnvironment, SimulatedGps, SimulatedParticulate,
        SimulatedPyranometer,
    };

    const MAX_STEPS: usize = 500;

    fn quick_config() -> NodeConfig {
        NodeConfig {
            gps_refine_samples: 2,
            gps_refine_interval_ms: 100,
            sensor_retry_delay_ms: 10,
            ..NodeConfig::default()
        }
    }

    fn sensors() -> Vec<Box<dyn Sensor>> {
        vec![
            Box::new(SimulatedEnvironment::new()),
            Box::new(SimulatedPyranometer::new(420.0)),
            Box::new(SimulatedAnemometer::new(3.5)),
        ]
    }

    fn peripherals(
        gps: SimulatedGps,
        rails: &TrackedRails,
        retained: &RamRetained,
        input: Box<dyn UserInput>,
    ) -> Peripherals {
        Peripherals {
            sensors: sensors(),
            gps: Some(Box::new(gps)),
            rails: Box::new(rails.clone()),
            input,
            retained: Box::new(retained.clone()),
        }
    }

    fn here() -> Position {
        Position::new(52.0907, 5.1214, 8.5)
    }

    fn run_steps<R: Radio, S: PersistenceStore, P: Platform>(
        node: &mut TelemetryNode<R, S, P>,
        max: usize,
    ) -> Option<u64> {
        for _ in 0..max {
            if let Some(slept) = node.step().unwrap() {
                return Some(slept);
            }
        }
        None
    }

    fn warm_retained(want_gps: bool) -> RamRetained {
        let mut retained = RamRetained::new();
        retained.store(&RetainedState {
            boot_count: 3,
            want_gps,
            uplink_sequence: 0,
            last_position: Some(here()),
        });
        retained
    }

    #[test]
    fn test_cold_boot_joins_sends_and_sleeps() {
        let mut platform = HostPlatform::new();
        let mut store = MemoryStore::new();
        let rails = TrackedRails::new();
        let retained = RamRetained::new();

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            &mut store,
            &mut platform,
            peripherals(SimulatedGps::new(here(), 3), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        node.boot().unwrap();
        assert!(rails.is_enabled(Rail::Gps));

        let slept = run_steps(&mut node, MAX_STEPS).expect("node never slept");
        assert!(slept > 0 && slept < 60_000);
        assert_eq!(node.phase(), Phase::Sleeping);
        assert_eq!(node.radio().submits(), 1);
        assert_eq!(node.radio().join_starts(), 1);
        assert!(!node.radio().is_awake());
        assert!(node.tracker().acknowledged());

        // GPS record first, on its channel.
        let payload = node.radio().last_payload().to_vec();
        assert_eq!(&payload[..2], &[1, 0x88]);
        assert_eq!(payload.len(), 48);
        drop(node);

        let state = retained.state();
        assert!(!state.want_gps);
        assert_eq!(state.last_position, Some(here()));
        assert_eq!(state.uplink_sequence, 1);
        assert!(!rails.is_enabled(Rail::Lora));
        assert!(!rails.is_enabled(Rail::Gps));
        assert_eq!(platform.sleeps(), &[slept]);
        assert!(Session::load(&mut store).is_some());
    }

    #[test]
    fn test_no_new_cycle_while_uplink_pending() {
        let mut platform = HostPlatform::new();
        let retained = warm_retained(false);
        let rails = TrackedRails::new();
        let config = NodeConfig {
            send_interval_ms: 1_000,
            ..quick_config()
        };

        let mut node = TelemetryNode::new(
            config,
            OtaaCredentials::default(),
            SimulatedRadio::new().with_tx_after(u32::MAX),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        node.boot().unwrap();

        // Several send intervals pass with the first uplink still in flight.
        assert_eq!(run_steps(&mut node, 100), None);
        assert_eq!(node.radio().submits(), 1);
        assert!(node.session().is_pending());
        assert_eq!(
            node.tracker().last_outcome(),
            Some(TransmissionOutcome::Queued)
        );
    }

    #[test]
    fn test_counter_resumes_from_flash_then_retained_memory() {
        let mut platform = HostPlatform::new();
        let mut store = MemoryStore::new();
        store
            .open(NAMESPACE, false)
            .unwrap()
            .put_u32(KEY_COUNT, 41)
            .unwrap();
        let retained = RamRetained::new();
        let rails = TrackedRails::new();

        for expected in [41, 42] {
            let mut node = TelemetryNode::new(
                quick_config(),
                OtaaCredentials::default(),
                SimulatedRadio::new(),
                &mut store,
                &mut platform,
                peripherals(SimulatedGps::new(here(), 1), &rails, &retained, Box::new(NoInput)),
            )
            .unwrap();
            node.boot().unwrap();
            run_steps(&mut node, MAX_STEPS).expect("node never slept");
            assert_eq!(node.radio().last_sequence_number(), Some(expected));
        }

        assert_eq!(retained.state().uplink_sequence, 43);
        assert_eq!(store.peek_u32(NAMESPACE, KEY_COUNT), Some(42));
        assert_eq!(platform.sleeps().len(), 2);
    }

    #[test]
    fn test_restored_session_skips_join() {
        let mut platform = HostPlatform::new().with_wake_cause(WakeCause::Timer);
        let mut store = MemoryStore::new();
        Session::new(0x13, 0x2601_1234, [1; 16], [2; 16])
            .store(&mut store)
            .unwrap();
        let retained = warm_retained(false);
        let rails = TrackedRails::new();

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            &mut store,
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        node.boot().unwrap();
        assert!(node.session().is_joined());

        run_steps(&mut node, MAX_STEPS).expect("node never slept");
        assert_eq!(node.radio().join_starts(), 0);
        assert_eq!(node.radio().submits(), 1);
    }

    #[test]
    fn test_gps_never_fixes_sleeps_without_transmitting() {
        let mut platform = HostPlatform::new();
        let retained = RamRetained::new();
        let rails = TrackedRails::new();
        let config = NodeConfig {
            gps_wait_for_lock_ms: Some(2_000),
            ..quick_config()
        };

        let mut node = TelemetryNode::new(
            config,
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        node.boot().unwrap();

        let slept = run_steps(&mut node, MAX_STEPS).expect("node never slept");
        assert_eq!(node.radio().submits(), 0);
        assert_eq!(slept, 60_000 - 2_100);
        drop(node);

        // Still wants a fix next wake, with the receiver left powered.
        assert!(retained.state().want_gps);
        assert!(rails.is_enabled(Rail::Gps));
        assert!(!rails.is_enabled(Rail::Lora));
    }

    #[test]
    fn test_button_wake_requests_position() {
        let mut platform = HostPlatform::new().with_wake_cause(WakeCause::Button);
        let retained = warm_retained(false);
        let rails = TrackedRails::new();

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::new(here(), 1), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        assert!(node.retained().want_gps);
        node.boot().unwrap();
        assert!(rails.is_enabled(Rail::Gps));
    }

    #[test]
    fn test_reset_request_forgets_session() {
        let mut platform = HostPlatform::new().with_wake_cause(WakeCause::Timer);
        let mut store = MemoryStore::new();
        Session::new(0x13, 0x2601_1234, [1; 16], [2; 16])
            .store(&mut store)
            .unwrap();
        let retained = warm_retained(false);
        let rails = TrackedRails::new();
        let input = ScriptedInput::new().at(100, UserRequest::ResetSession);

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new().never_join(),
            &mut store,
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(input)),
        )
        .unwrap();
        node.boot().unwrap();
        assert!(node.session().is_joined());

        // The restored session sends right away, the reset comes on the next step.
        node.step().unwrap();
        assert_eq!(node.radio().submits(), 1);
        node.step().unwrap();
        assert!(!node.session().is_joined());
        assert_eq!(node.radio().join_starts(), 1);
        assert!(!node.tracker().is_queued());
        drop(node);

        assert!(Session::load(&mut store).is_none());
    }

    #[test]
    fn test_send_position_request_wakes_gps() {
        let mut platform = HostPlatform::new().with_wake_cause(WakeCause::Timer);
        let retained = warm_retained(false);
        let rails = TrackedRails::new();
        let input = ScriptedInput::new().at(0, UserRequest::SendPosition);

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new().never_join(),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(input)),
        )
        .unwrap();
        node.boot().unwrap();
        assert!(!rails.is_enabled(Rail::Gps));

        node.step().unwrap();
        assert!(node.retained().want_gps);
        assert!(rails.is_enabled(Rail::Gps));
    }

    #[test]
    fn test_payload_overflow_is_fatal() {
        let mut platform = HostPlatform::new();
        let retained = warm_retained(false);
        let rails = TrackedRails::new();
        let mut parts =
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput));
        parts.sensors.push(Box::new(SimulatedParticulate::new()));

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            MemoryStore::new(),
            &mut platform,
            parts,
        )
        .unwrap();
        node.boot().unwrap();

        let err = (0..MAX_STEPS)
            .find_map(|_| node.step().err())
            .expect("overflow not reported");
        assert!(matches!(err, NodeError::Encode(EncodeError::Overflow { .. })));
        assert_eq!(node.radio().submits(), 0);
    }

    #[test]
    fn test_radio_init_failure_is_fatal() {
        let mut platform = HostPlatform::new();
        let retained = RamRetained::new();
        let rails = TrackedRails::new();

        let mut node = TelemetryNode::new(
            quick_config(),
            OtaaCredentials::default(),
            SimulatedRadio::new().with_init_failure(),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        assert!(matches!(node.boot(), Err(NodeError::RadioInit(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let retained = RamRetained::new();
        let rails = TrackedRails::new();
        let config = NodeConfig {
            max_payload: 0,
            ..quick_config()
        };

        let result = TelemetryNode::new(
            config,
            OtaaCredentials::default(),
            SimulatedRadio::new(),
            MemoryStore::new(),
            HostPlatform::new(),
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        );
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn test_stuck_uplink_starves_watchdog() {
        let mut platform = HostPlatform::new();
        let retained = warm_retained(false);
        let rails = TrackedRails::new();
        let config = NodeConfig {
            watchdog_timeout_ms: 1_000,
            ..quick_config()
        };

        let mut node = TelemetryNode::new(
            config,
            OtaaCredentials::default(),
            SimulatedRadio::new().with_tx_after(u32::MAX),
            MemoryStore::new(),
            &mut platform,
            peripherals(SimulatedGps::without_fix(), &rails, &retained, Box::new(NoInput)),
        )
        .unwrap();
        node.boot().unwrap();

        assert_eq!(run_steps(&mut node, 40), None);
        let feeds = node.platform_mut().feeds();
        assert_eq!(run_steps(&mut node, 40), None);
        assert_eq!(node.platform_mut().feeds(), feeds);
    }
}
