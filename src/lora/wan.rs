//! Radio session state machine.
//!
//! Owns the [`Session`], the [`UplinkCounter`] and the radio. Drives OTAA
//! join (or restores a persisted session), enforces the single in-flight
//! uplink rule, and turns radio events into [`SessionEvent`]s delivered to
//! registered [`EventSink`]s.
//!
//! ```text
//! Unjoined -> Joining -> Idle <-> TxPending
//!                ^          |
//!                +- reset --+
//! ```
//!
//! Everything runs on the caller's thread: events are only raised from
//! [`RadioSession::poll`], [`RadioSession::join`] and [`RadioSession::send`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tbeam_node::config::NodeConfig;
//! use tbeam_node::lora::{
//!     RadioSession, SessionEvent, SimulatedRadio, TransmissionOutcome, TransmissionRequest,
//!     UplinkCounter,
//! };
//! use tbeam_node::persistence::MemoryStore;
//!
//! let config = NodeConfig::default();
//! let counter = UplinkCounter::new(0, config.counter_flush_interval_ms);
//! let log = |event: &SessionEvent| println!("{:?}", event);
//! let mut session = RadioSession::new(
//!     SimulatedRadio::new(),
//!     MemoryStore::new(),
//!     counter,
//!     &config,
//!     Rc::new(log),
//! );
//!
//! session.join();
//! while !session.is_joined() {
//!     session.poll();
//! }
//! let outcome = session.send(TransmissionRequest::new(vec![1, 2, 3], 1, true), 0);
//! assert_eq!(outcome, TransmissionOutcome::Queued);
//! ```

use super::counter::UplinkCounter;
use super::radio::{Radio, RadioEvent, SpreadingFactor, SubmitStatus};
use super::session::Session;
use crate::config::NodeConfig;
use crate::persistence::PersistenceStore;
use log::{debug, error, info, warn};
use std::rc::Rc;

/// Upper bound on events drained per [`RadioSession::poll`].
const MAX_EVENTS_PER_POLL: usize = 16;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joining,
    /// Joined, nothing in flight.
    Idle,
    /// Joined, one uplink queued or in its receive windows.
    TxPending,
}

/// Outcome of an uplink, as reported to sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionOutcome {
    /// Accepted by the MAC; the counter was incremented.
    Queued,
    /// Another uplink is still pending; nothing changed.
    RejectedPending,
    /// The network acknowledged a confirmed uplink.
    Acknowledged,
    /// A downlink arrived in the receive windows.
    ResponseReceived,
    /// Not joined, or the MAC refused the payload.
    Failed,
}

/// Notification delivered to sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Raw radio event, forwarded for observability.
    Radio(RadioEvent),
    /// A session became usable. `restored` is set for a fast rejoin from
    /// persisted keys.
    Joined { restored: bool },
    Outcome(TransmissionOutcome),
}

/// Receiver of session notifications.
pub trait EventSink {
    fn notify(&self, event: &SessionEvent);
}

impl<F: Fn(&SessionEvent)> EventSink for F {
    fn notify(&self, event: &SessionEvent) {
        self(event)
    }
}

/// One uplink to hand to the MAC. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionRequest {
    pub payload: Vec<u8>,
    pub port: u8,
    pub confirmed: bool,
}

impl TransmissionRequest {
    pub fn new(payload: Vec<u8>, port: u8, confirmed: bool) -> Self {
        Self {
            payload,
            port,
            confirmed,
        }
    }
}

/// The radio session state machine.
pub struct RadioSession<R: Radio, S: PersistenceStore> {
    radio: R,
    store: S,
    counter: UplinkCounter,
    state: SessionState,
    session: Option<Session>,
    spreading_factor: SpreadingFactor,
    adaptive_data_rate: bool,
    tx_power_dbm: i8,
    callback: Rc<dyn EventSink>,
    observers: Vec<Rc<dyn EventSink>>,
}

impl<R: Radio, S: PersistenceStore> RadioSession<R, S> {
    /// Create an unjoined session. `callback` is the primary sink.
    pub fn new(
        radio: R,
        store: S,
        counter: UplinkCounter,
        config: &NodeConfig,
        callback: Rc<dyn EventSink>,
    ) -> Self {
        Self {
            radio,
            store,
            counter,
            state: SessionState::Unjoined,
            session: None,
            spreading_factor: config.spreading_factor,
            adaptive_data_rate: config.adaptive_data_rate,
            tx_power_dbm: config.tx_power_dbm,
            callback,
            observers: Vec::new(),
        }
    }

    /// Replace the primary sink.
    pub fn register_callback(&mut self, callback: Rc<dyn EventSink>) {
        self.callback = callback;
    }

    /// Add a sink that receives every event after the primary one.
    pub fn add_observer(&mut self, observer: Rc<dyn EventSink>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::TxPending)
    }

    pub fn is_pending(&self) -> bool {
        self.state == SessionState::TxPending
    }

    pub fn counter(&self) -> &UplinkCounter {
        &self.counter
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the state machine, returning the radio and store.
    pub fn into_parts(self) -> (R, S) {
        (self.radio, self.store)
    }

    /// Restore the persisted session, or start an OTAA join.
    ///
    /// A no-op while already joining or joined.
    pub fn join(&mut self) {
        match self.state {
            SessionState::Joining => {
                debug!("Join already in progress");
                return;
            }
            SessionState::Idle | SessionState::TxPending => {
                debug!("Already joined");
                return;
            }
            SessionState::Unjoined => {}
        }

        self.radio.set_data_rate(self.spreading_factor);
        self.radio.set_tx_power(self.tx_power_dbm);

        match Session::load(&mut self.store) {
            Some(session) => {
                info!("Rejoining saved session");
                self.radio.set_session(&session);
                self.radio.set_adaptive_data_rate(self.adaptive_data_rate);
                self.session = Some(session);
                self.state = SessionState::Idle;
                self.emit(SessionEvent::Joined { restored: true });
            }
            None => {
                info!("No session saved, joining from scratch");
                self.radio.start_join();
                self.state = SessionState::Joining;
            }
        }
    }

    /// Queue one uplink.
    ///
    /// Refuses with [`TransmissionOutcome::RejectedPending`] while another
    /// uplink is in flight. On success the counter is flushed (rate-limited),
    /// handed to the MAC as the frame counter, and incremented.
    pub fn send(&mut self, request: TransmissionRequest, now_ms: u64) -> TransmissionOutcome {
        match self.state {
            SessionState::TxPending => {
                debug!("Uplink rejected: previous transmission pending");
                return self.finish(TransmissionOutcome::RejectedPending);
            }
            SessionState::Unjoined | SessionState::Joining => {
                warn!("Uplink dropped: not joined");
                return self.finish(TransmissionOutcome::Failed);
            }
            SessionState::Idle => {}
        }

        self.counter.flush(&mut self.store, now_ms);
        self.radio.set_sequence_number(self.counter.value());

        match self
            .radio
            .submit_uplink(request.port, &request.payload, request.confirmed)
        {
            Ok(SubmitStatus::Accepted) => {
                debug!(
                    "Uplink #{} queued: {} B on port {}",
                    self.counter.value(),
                    request.payload.len(),
                    request.port
                );
                self.state = SessionState::TxPending;
                let outcome = self.finish(TransmissionOutcome::Queued);
                self.counter.increment();
                outcome
            }
            Ok(SubmitStatus::Busy) => {
                debug!("Uplink rejected: MAC busy");
                self.finish(TransmissionOutcome::RejectedPending)
            }
            Err(e) => {
                error!("Uplink refused by radio: {}", e);
                self.finish(TransmissionOutcome::Failed)
            }
        }
    }

    /// Run the MAC once and dispatch every event it raised.
    ///
    /// Returns the number of events handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_EVENTS_PER_POLL {
            match self.radio.poll_once() {
                Some(event) => {
                    self.on_radio_event(event);
                    handled += 1;
                }
                None => break,
            }
        }
        handled
    }

    /// Interpret one radio event.
    pub fn on_radio_event(&mut self, event: RadioEvent) {
        info!("{}", event);
        match event {
            RadioEvent::Joined => self.on_joined(),
            RadioEvent::TxComplete { ack, downlink_len } => {
                if self.state == SessionState::TxPending {
                    self.state = SessionState::Idle;
                }
                if ack {
                    self.emit(SessionEvent::Outcome(TransmissionOutcome::Acknowledged));
                }
                if downlink_len > 0 {
                    self.emit(SessionEvent::Outcome(TransmissionOutcome::ResponseReceived));
                }
            }
            RadioEvent::JoinFailed | RadioEvent::RejoinFailed => {
                warn!("Join attempt failed, MAC will retry");
            }
            RadioEvent::ScanTimeout
            | RadioEvent::BeaconFound
            | RadioEvent::BeaconMissed
            | RadioEvent::BeaconTracked
            | RadioEvent::Joining
            | RadioEvent::LostTSync
            | RadioEvent::Reset
            | RadioEvent::RxComplete
            | RadioEvent::LinkDead
            | RadioEvent::LinkAlive
            | RadioEvent::TxStart
            | RadioEvent::JoinTxComplete
            | RadioEvent::Unknown(_) => {}
        }
        self.emit(SessionEvent::Radio(event));
    }

    /// Forget the session and start a full join.
    pub fn reset(&mut self) {
        if let Err(e) = Session::erase(&mut self.store) {
            error!("Failed to erase session: {}", e);
        }
        self.session = None;
        self.state = SessionState::Unjoined;
        self.join();
    }

    /// Put the radio to sleep.
    pub fn shutdown(&mut self) {
        self.radio.shutdown();
    }

    fn on_joined(&mut self) {
        if self.state != SessionState::Joining {
            debug!("Joined event outside of a join, ignoring");
            return;
        }

        let Some(session) = self.radio.session_keys() else {
            error!("Joined but the radio reported no session keys");
            return;
        };
        debug!("Received new netId, devAddr, nwkKey and artKey from network");

        // Keys are written before the state says joined.
        if let Err(e) = session.store(&mut self.store) {
            error!("Cannot persist session keys: {}", e);
        }

        self.radio.set_adaptive_data_rate(self.adaptive_data_rate);
        self.session = Some(session);
        self.state = SessionState::Idle;
        self.emit(SessionEvent::Joined { restored: false });
    }

    fn finish(&self, outcome: TransmissionOutcome) -> TransmissionOutcome {
        self.emit(SessionEvent::Outcome(outcome));
        outcome
    }

    fn emit(&self, event: SessionEvent) {
        self.callback.notify(&event);
        for observer in &self.observers {
            observer.notify(&event);
        }
    }
}
