//! Wireless radio boundary
//!
//! The radio stack handles advertisement scanning, pairing and characteristic
//! discovery. The crate only consumes the contract below and reacts to the
//! [`RadioEvent`]s the stack delivers, from whatever thread it runs on.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::remote::{RemoteId, SessionHandle};

/// BLE-MIDI service identifier
pub const MIDI_SERVICE_UUID: &str = "03B80E5A-EDE8-4B33-A751-6CE34EC4C700";

/// BLE-MIDI I/O characteristic identifier
pub const MIDI_CHARACTERISTIC_UUID: &str = "7772E5DB-3868-4112-A1A9-F2669D106BF3";

/// Power state of the local radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PowerState::Unknown => "unknown",
            PowerState::Resetting => "resetting",
            PowerState::Unsupported => "unsupported",
            PowerState::Unauthorized => "unauthorized",
            PowerState::PoweredOff => "powered off",
            PowerState::PoweredOn => "powered on",
        };
        write!(f, "{}", name)
    }
}

/// Options for a session connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Let the radio stack re-establish the link after it drops
    pub auto_reconnect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
        }
    }
}

/// Radio failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("radio is {0}")]
    NotReady(PowerState),

    #[error("unknown session {0}")]
    UnknownSession(SessionHandle),

    #[error("{0}")]
    Platform(String),
}

/// Callback from the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    PowerStateChanged(PowerState),

    /// A peripheral advertising the service filter was seen
    Discovered {
        id: RemoteId,
        name: Option<String>,
        advertised_name: Option<String>,
        session: SessionHandle,
    },

    Connected { session: SessionHandle },

    FailedToConnect { session: SessionHandle, error: String },

    /// The link dropped; `error` is `None` after an intentional cancel
    Disconnected {
        session: SessionHandle,
        error: Option<String>,
        is_reconnecting: bool,
    },

    /// The MIDI characteristic was discovered and notifications enabled
    ServiceReady { session: SessionHandle },

    /// Characteristic notification carrying wire-format MIDI
    Notified { session: SessionHandle, data: Vec<u8> },
}

/// Radio stack as seen by the wireless transport
pub trait RadioStack: Send {
    fn power_state(&self) -> PowerState;

    fn is_powered_on(&self) -> bool {
        self.power_state() == PowerState::PoweredOn
    }

    fn scan(&mut self, service: Uuid) -> Result<(), RadioError>;

    fn stop_scan(&mut self);

    fn connect(
        &mut self,
        session: SessionHandle,
        options: ConnectOptions,
    ) -> Result<(), RadioError>;

    fn cancel_connection(&mut self, session: SessionHandle);

    /// Write one value to the MIDI characteristic without response
    fn write(&mut self, session: SessionHandle, data: &[u8]) -> Result<(), RadioError>;

    /// Largest value a single write may carry on this session
    fn max_write_len(&self, session: SessionHandle) -> usize;
}

/// Request recorded by a [`LoopbackRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioRequest {
    Scan(Uuid),
    StopScan,
    Connect(SessionHandle, ConnectOptions),
    Cancel(SessionHandle),
    Write(SessionHandle, Vec<u8>),
}

#[derive(Debug)]
struct LoopbackState {
    power: PowerState,
    max_write_len: usize,
    fail_writes: bool,
    requests: Vec<RadioRequest>,
}

/// Radio stack that records requests instead of driving hardware
///
/// Events are fed back by the owner through the manager, which makes it the
/// stand-in for a platform stack in tests and dry runs. Clones share state.
#[derive(Debug, Clone)]
pub struct LoopbackRadio {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackRadio {
    pub fn new(power: PowerState, max_write_len: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                power,
                max_write_len,
                fail_writes: false,
                requests: Vec::new(),
            })),
        }
    }

    pub fn set_power_state(&self, power: PowerState) {
        self.state.lock().power = power;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn requests(&self) -> Vec<RadioRequest> {
        self.state.lock().requests.clone()
    }

    /// Values written so far, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .requests
            .iter()
            .filter_map(|r| match r {
                RadioRequest::Write(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RadioStack for LoopbackRadio {
    fn power_state(&self) -> PowerState {
        self.state.lock().power
    }

    fn scan(&mut self, service: Uuid) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        if state.power != PowerState::PoweredOn {
            return Err(RadioError::NotReady(state.power));
        }
        state.requests.push(RadioRequest::Scan(service));
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.state.lock().requests.push(RadioRequest::StopScan);
    }

    fn connect(
        &mut self,
        session: SessionHandle,
        options: ConnectOptions,
    ) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        if state.power != PowerState::PoweredOn {
            return Err(RadioError::NotReady(state.power));
        }
        state.requests.push(RadioRequest::Connect(session, options));
        Ok(())
    }

    fn cancel_connection(&mut self, session: SessionHandle) {
        self.state.lock().requests.push(RadioRequest::Cancel(session));
    }

    fn write(&mut self, session: SessionHandle, data: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(RadioError::Platform("write rejected".to_string()));
        }
        state.requests.push(RadioRequest::Write(session, data.to_vec()));
        Ok(())
    }

    fn max_write_len(&self, _session: SessionHandle) -> usize {
        self.state.lock().max_write_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuids_parse() {
        assert!(Uuid::parse_str(MIDI_SERVICE_UUID).is_ok());
        assert!(Uuid::parse_str(MIDI_CHARACTERISTIC_UUID).is_ok());
    }

    #[test]
    fn test_loopback_refuses_scan_when_off() {
        let mut radio = LoopbackRadio::new(PowerState::PoweredOff, 20);
        let service = Uuid::parse_str(MIDI_SERVICE_UUID).unwrap();

        assert_eq!(
            radio.scan(service),
            Err(RadioError::NotReady(PowerState::PoweredOff))
        );
        assert!(!radio.is_powered_on());

        radio.set_power_state(PowerState::PoweredOn);
        radio.scan(service).unwrap();
        assert_eq!(radio.requests(), vec![RadioRequest::Scan(service)]);
    }

    #[test]
    fn test_loopback_records_writes() {
        let mut radio = LoopbackRadio::new(PowerState::PoweredOn, 20);
        radio.write(SessionHandle(1), &[0x80, 0x80, 0xC0, 0x01]).unwrap();

        radio.fail_writes(true);
        assert!(radio.write(SessionHandle(1), &[0x00]).is_err());
        assert_eq!(radio.writes(), vec![vec![0x80, 0x80, 0xC0, 0x01]]);
    }
}
