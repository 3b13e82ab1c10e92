//! LoRaWAN session handling.
//!
//! This module contains:
//! - `radio`: the radio layer capability and its event type
//! - [`session`]: session keys and their persisted layout
//! - `counter`: uplink counter with rate-limited flush
//! - `wan`: the radio session state machine
//! - `sim`: simulated MAC for host runs and tests

mod counter;
mod radio;
pub mod session;
mod sim;
mod wan;

pub use counter::UplinkCounter;
pub use radio::{Radio, RadioError, RadioEvent, SpreadingFactor, SubmitStatus};
pub use session::Session;
pub use sim::SimulatedRadio;
pub use wan::{
    EventSink, RadioSession, SessionEvent, SessionState, TransmissionOutcome, TransmissionRequest,
};
