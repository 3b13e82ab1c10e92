//! Simulated LoRaWAN MAC.
//!
//! Scripted behaviour for host runs and tests: a join completes after a
//! configurable number of polls (optionally after some failures), an uplink
//! completes after a few more, with or without ACK and downlink. Session keys
//! are drawn from `OsRng` like a real join would produce fresh ones.

use super::radio::{Radio, RadioError, RadioEvent, SpreadingFactor, SubmitStatus};
use super::session::{Session, KEY_LEN};
use crate::config::{OtaaCredentials, PinMapping, MAX_LORAWAN_PAYLOAD};
use log::debug;
use rand_core::{OsRng, RngCore};
use std::collections::VecDeque;

/// In-process stand-in for the LoRaWAN MAC.
#[derive(Debug)]
pub struct SimulatedRadio {
    join_after: u32,
    tx_after: u32,
    join_failures: u32,
    ack: bool,
    downlink_len: u8,
    fail_init: bool,
    busy: bool,

    initialized: bool,
    joining: Option<u32>,
    in_flight: Option<(u32, bool)>,
    session: Option<Session>,
    events: VecDeque<RadioEvent>,

    join_starts: u32,
    submits: u32,
    last_seqno: Option<u32>,
    last_payload: Vec<u8>,
    data_rate: Option<SpreadingFactor>,
    adr: bool,
    tx_power_dbm: i8,
    awake: bool,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRadio {
    /// Joins after 2 polls, uplinks complete after 2 polls, confirmed
    /// uplinks are acknowledged, no downlink.
    pub fn new() -> Self {
        Self {
            join_after: 2,
            tx_after: 2,
            join_failures: 0,
            ack: true,
            downlink_len: 0,
            fail_init: false,
            busy: false,
            initialized: false,
            joining: None,
            in_flight: None,
            session: None,
            events: VecDeque::new(),
            join_starts: 0,
            submits: 0,
            last_seqno: None,
            last_payload: Vec::new(),
            data_rate: None,
            adr: false,
            tx_power_dbm: 0,
            awake: true,
        }
    }

    pub fn with_join_after(mut self, polls: u32) -> Self {
        self.join_after = polls;
        self
    }

    pub fn with_tx_after(mut self, polls: u32) -> Self {
        self.tx_after = polls;
        self
    }

    /// Fail this many join attempts before succeeding.
    pub fn with_join_failures(mut self, failures: u32) -> Self {
        self.join_failures = failures;
        self
    }

    /// Whether confirmed uplinks get an ACK.
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Downlink size delivered with every completed uplink.
    pub fn with_downlink(mut self, len: u8) -> Self {
        self.downlink_len = len;
        self
    }

    /// Make [`Radio::initialize`] fail.
    pub fn with_init_failure(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Never complete a join.
    pub fn never_join(mut self) -> Self {
        self.join_after = u32::MAX;
        self
    }

    /// Report the MAC as busy on every submit.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Inject an event delivered by the next poll.
    pub fn push_event(&mut self, event: RadioEvent) {
        self.events.push_back(event);
    }

    pub fn join_starts(&self) -> u32 {
        self.join_starts
    }

    pub fn submits(&self) -> u32 {
        self.submits
    }

    pub fn last_sequence_number(&self) -> Option<u32> {
        self.last_seqno
    }

    pub fn last_payload(&self) -> &[u8] {
        &self.last_payload
    }

    pub fn data_rate(&self) -> Option<SpreadingFactor> {
        self.data_rate
    }

    pub fn adaptive_data_rate(&self) -> bool {
        self.adr
    }

    pub fn tx_power(&self) -> i8 {
        self.tx_power_dbm
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    fn fresh_session() -> Session {
        let mut network_key = [0u8; KEY_LEN];
        let mut application_key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut network_key);
        OsRng.fill_bytes(&mut application_key);
        Session::new(
            0x13,
            0x2600_0000 | (OsRng.next_u32() & 0x01FF_FFFF),
            network_key,
            application_key,
        )
    }

    fn tick_join(&mut self) {
        let Some(remaining) = self.joining else {
            return;
        };
        if remaining > 1 {
            self.joining = Some(remaining - 1);
            return;
        }
        self.events.push_back(RadioEvent::JoinTxComplete);
        if self.join_failures > 0 {
            self.join_failures -= 1;
            self.events.push_back(RadioEvent::JoinFailed);
            self.joining = Some(self.join_after);
        } else {
            self.joining = None;
            self.session = Some(Self::fresh_session());
            self.events.push_back(RadioEvent::Joined);
        }
    }

    fn tick_tx(&mut self) {
        let Some((remaining, confirmed)) = self.in_flight else {
            return;
        };
        if remaining > 1 {
            self.in_flight = Some((remaining - 1, confirmed));
            return;
        }
        self.in_flight = None;
        self.events.push_back(RadioEvent::TxComplete {
            ack: confirmed && self.ack,
            downlink_len: self.downlink_len,
        });
    }
}

impl Radio for SimulatedRadio {
    fn initialize(
        &mut self,
        pins: &PinMapping,
        _credentials: &OtaaCredentials,
    ) -> Result<(), RadioError> {
        if self.fail_init {
            return Err(RadioError::InitFailed(format!(
                "no response on NSS GPIO{}",
                pins.nss
            )));
        }
        debug!("Simulated radio up (NSS {}, RST {})", pins.nss, pins.reset);
        self.initialized = true;
        self.awake = true;
        Ok(())
    }

    fn start_join(&mut self) {
        self.join_starts += 1;
        self.session = None;
        self.joining = Some(self.join_after);
        self.events.push_back(RadioEvent::Joining);
    }

    fn set_data_rate(&mut self, sf: SpreadingFactor) {
        self.data_rate = Some(sf);
    }

    fn set_adaptive_data_rate(&mut self, enabled: bool) {
        self.adr = enabled;
    }

    fn set_tx_power(&mut self, dbm: i8) {
        self.tx_power_dbm = dbm;
    }

    fn set_session(&mut self, session: &Session) {
        self.joining = None;
        self.session = Some(session.clone());
    }

    fn session_keys(&self) -> Option<Session> {
        self.session.clone()
    }

    fn set_sequence_number(&mut self, seqno: u32) {
        self.last_seqno = Some(seqno);
    }

    fn submit_uplink(
        &mut self,
        _port: u8,
        payload: &[u8],
        confirmed: bool,
    ) -> Result<SubmitStatus, RadioError> {
        if self.session.is_none() {
            return Err(RadioError::NotJoined);
        }
        if payload.len() > MAX_LORAWAN_PAYLOAD {
            return Err(RadioError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_LORAWAN_PAYLOAD,
            });
        }
        if self.busy || self.in_flight.is_some() {
            return Ok(SubmitStatus::Busy);
        }
        self.submits += 1;
        self.last_payload = payload.to_vec();
        self.in_flight = Some((self.tx_after, confirmed));
        self.events.push_back(RadioEvent::TxStart);
        Ok(SubmitStatus::Accepted)
    }

    fn poll_once(&mut self) -> Option<RadioEvent> {
        if self.events.is_empty() {
            self.tick_join();
            self.tick_tx();
        }
        self.events.pop_front()
    }

    fn shutdown(&mut self) {
        self.awake = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(radio: &mut SimulatedRadio, polls: usize) -> Vec<RadioEvent> {
        (0..polls).filter_map(|_| radio.poll_once()).collect()
    }

    #[test]
    fn test_join_sequence() {
        let mut radio = SimulatedRadio::new().with_join_after(2);
        radio.start_join();

        let events = drain(&mut radio, 5);
        assert_eq!(
            events,
            vec![
                RadioEvent::Joining,
                RadioEvent::JoinTxComplete,
                RadioEvent::Joined
            ]
        );
        assert!(radio.session_keys().is_some());
    }

    #[test]
    fn test_join_failures_then_success() {
        let mut radio = SimulatedRadio::new().with_join_after(1).with_join_failures(2);
        radio.start_join();

        let events = drain(&mut radio, 10);
        let failures = events.iter().filter(|e| **e == RadioEvent::JoinFailed).count();
        assert_eq!(failures, 2);
        assert_eq!(events.last(), Some(&RadioEvent::Joined));
    }

    #[test]
    fn test_submit_requires_session() {
        let mut radio = SimulatedRadio::new();
        assert_eq!(radio.submit_uplink(1, &[1], true), Err(RadioError::NotJoined));
    }

    #[test]
    fn test_submit_while_in_flight_is_busy() {
        let mut radio = SimulatedRadio::new();
        radio.set_session(&Session::new(1, 2, [0; KEY_LEN], [0; KEY_LEN]));

        assert_eq!(radio.submit_uplink(1, &[1], true), Ok(SubmitStatus::Accepted));
        assert_eq!(radio.submit_uplink(1, &[2], true), Ok(SubmitStatus::Busy));
        assert_eq!(radio.submits(), 1);

        let events = drain(&mut radio, 4);
        assert_eq!(
            events,
            vec![
                RadioEvent::TxStart,
                RadioEvent::TxComplete {
                    ack: true,
                    downlink_len: 0
                }
            ]
        );
        assert_eq!(radio.submit_uplink(1, &[3], true), Ok(SubmitStatus::Accepted));
    }

    #[test]
    fn test_oversize_payload_refused() {
        let mut radio = SimulatedRadio::new();
        radio.set_session(&Session::new(1, 2, [0; KEY_LEN], [0; KEY_LEN]));
        let payload = vec![0u8; MAX_LORAWAN_PAYLOAD + 1];
        assert!(matches!(
            radio.submit_uplink(1, &payload, false),
            Err(RadioError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_init_failure() {
        let mut radio = SimulatedRadio::new().with_init_failure();
        let result = radio.initialize(&PinMapping::default(), &OtaaCredentials::default());
        assert!(matches!(result, Err(RadioError::InitFailed(_))));
        assert!(!radio.is_initialized());
    }
}
