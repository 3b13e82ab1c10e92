//! Radio layer capability.
//!
//! The LoRaWAN MAC (channel plans, airtime rules, crypto) lives behind the
//! [`Radio`] trait. The session state machine only ever talks to this trait;
//! on the bench it is backed by [`SimulatedRadio`](super::SimulatedRadio).
//!
//! # Pin Configuration (TTGO T-Beam, SX1276)
//!
//! | Signal | GPIO |
//! |--------|------|
//! | NSS (CS) | 18 |
//! | RESET | 23 |
//! | DIO0 / DIO1 / DIO2 | 26 / 33 / 32 |
//! | SPI CLK | 5 |
//! | SPI MISO | 19 |
//! | SPI MOSI | 27 |

use super::session::Session;
use crate::config::{OtaaCredentials, PinMapping};
use std::fmt;

/// LoRa spreading factor used for the first uplinks (ADR may change it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
pub enum SpreadingFactor {
    Sf7,
    Sf8,
    Sf9,
    Sf10,
    Sf11,
    Sf12,
}

impl SpreadingFactor {
    /// Numeric spreading factor (7-12).
    pub fn value(self) -> u8 {
        match self {
            Self::Sf7 => 7,
            Self::Sf8 => 8,
            Self::Sf9 => 9,
            Self::Sf10 => 10,
            Self::Sf11 => 11,
            Self::Sf12 => 12,
        }
    }

    /// EU868 data rate index at 125 kHz (SF12 = DR0 ... SF7 = DR5).
    pub fn data_rate(self) -> u8 {
        12 - self.value()
    }
}

/// Notification raised by the radio layer.
///
/// Mirrors the MAC's event list; the session state machine matches on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    ScanTimeout,
    BeaconFound,
    BeaconMissed,
    BeaconTracked,
    Joining,
    Joined,
    JoinFailed,
    RejoinFailed,
    /// An uplink finished, including its receive windows.
    TxComplete { ack: bool, downlink_len: u8 },
    LostTSync,
    Reset,
    RxComplete,
    LinkDead,
    LinkAlive,
    TxStart,
    JoinTxComplete,
    /// Event code the binding does not know.
    Unknown(u8),
}

impl RadioEvent {
    /// Symbolic name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanTimeout => "ScanTimeout",
            Self::BeaconFound => "BeaconFound",
            Self::BeaconMissed => "BeaconMissed",
            Self::BeaconTracked => "BeaconTracked",
            Self::Joining => "Joining",
            Self::Joined => "Joined",
            Self::JoinFailed => "JoinFailed",
            Self::RejoinFailed => "RejoinFailed",
            Self::TxComplete { .. } => "TxComplete",
            Self::LostTSync => "LostTSync",
            Self::Reset => "Reset",
            Self::RxComplete => "RxComplete",
            Self::LinkDead => "LinkDead",
            Self::LinkAlive => "LinkAlive",
            Self::TxStart => "TxStart",
            Self::JoinTxComplete => "JoinTxComplete",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TxComplete { ack, downlink_len } => write!(
                f,
                "TxComplete (ack: {}, downlink: {} B)",
                ack, downlink_len
            ),
            Self::Unknown(code) => write!(f, "Unknown event {}", code),
            other => f.write_str(other.name()),
        }
    }
}

/// Result of handing an uplink to the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Queued for the next available slot.
    Accepted,
    /// A transmission or receive window is still pending.
    Busy,
}

/// LoRaWAN MAC capability.
pub trait Radio {
    /// Bring up the transceiver. Failure here is a wiring or hardware fault.
    fn initialize(
        &mut self,
        pins: &PinMapping,
        credentials: &OtaaCredentials,
    ) -> Result<(), RadioError>;

    /// Start an OTAA join. The MAC retries on its own schedule.
    fn start_join(&mut self);

    fn set_data_rate(&mut self, sf: SpreadingFactor);

    fn set_adaptive_data_rate(&mut self, enabled: bool);

    fn set_tx_power(&mut self, dbm: i8);

    /// Install session keys obtained from an earlier join.
    fn set_session(&mut self, session: &Session);

    /// Keys of the current session, once joined.
    fn session_keys(&self) -> Option<Session>;

    /// Set the frame counter of the next uplink.
    fn set_sequence_number(&mut self, seqno: u32);

    fn submit_uplink(
        &mut self,
        port: u8,
        payload: &[u8],
        confirmed: bool,
    ) -> Result<SubmitStatus, RadioError>;

    /// Run the MAC scheduler once and return the next pending event, if any.
    ///
    /// Must be called every loop iteration.
    fn poll_once(&mut self) -> Option<RadioEvent>;

    /// Put the transceiver to sleep before the rails are cut.
    fn shutdown(&mut self);
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn initialize(
        &mut self,
        pins: &PinMapping,
        credentials: &OtaaCredentials,
    ) -> Result<(), RadioError> {
        (**self).initialize(pins, credentials)
    }

    fn start_join(&mut self) {
        (**self).start_join()
    }

    fn set_data_rate(&mut self, sf: SpreadingFactor) {
        (**self).set_data_rate(sf)
    }

    fn set_adaptive_data_rate(&mut self, enabled: bool) {
        (**self).set_adaptive_data_rate(enabled)
    }

    fn set_tx_power(&mut self, dbm: i8) {
        (**self).set_tx_power(dbm)
    }

    fn set_session(&mut self, session: &Session) {
        (**self).set_session(session)
    }

    fn session_keys(&self) -> Option<Session> {
        (**self).session_keys()
    }

    fn set_sequence_number(&mut self, seqno: u32) {
        (**self).set_sequence_number(seqno)
    }

    fn submit_uplink(
        &mut self,
        port: u8,
        payload: &[u8],
        confirmed: bool,
    ) -> Result<SubmitStatus, RadioError> {
        (**self).submit_uplink(port, payload, confirmed)
    }

    fn poll_once(&mut self) -> Option<RadioEvent> {
        (**self).poll_once()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Radio errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Transceiver did not respond during bring-up.
    InitFailed(String),
    /// Uplink attempted before a session exists.
    NotJoined,
    /// Payload larger than the MAC accepts.
    PayloadTooLarge { size: usize, max: usize },
    /// Fault reported by the transceiver.
    Hardware(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(reason) => write!(f, "radio init failed: {}", reason),
            Self::NotJoined => write!(f, "not joined"),
            Self::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {} bytes (max {})", size, max)
            }
            Self::Hardware(reason) => write!(f, "radio hardware error: {}", reason),
        }
    }
}

impl std::error::Error for RadioError {}
