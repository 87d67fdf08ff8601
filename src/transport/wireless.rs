//! Transport over the wireless radio link
//!
//! Scanning starts radio discovery filtered on the MIDI service. Remote state
//! follows the radio callbacks; a link that drops with an error is reconnected
//! unless the radio stack is already doing so.

use tracing::{debug, info};
use uuid::Uuid;

use super::{ScanOutcome, TransportError};
use crate::diagnostics::{Diagnostic, SharedSink};
use crate::radio::{ConnectOptions, RadioEvent, RadioStack, MIDI_SERVICE_UUID};
use crate::registry::{Registry, WirelessSighting};
use crate::remote::{RemoteId, RemoteState, SessionHandle};

/// Wireless transport settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirelessOptions {
    pub service: Uuid,
    /// Request a session as soon as a peripheral is discovered
    pub auto_connect_on_discovery: bool,
    pub connect: ConnectOptions,
}

impl Default for WirelessOptions {
    fn default() -> Self {
        Self {
            service: Uuid::parse_str(MIDI_SERVICE_UUID).unwrap_or_default(),
            auto_connect_on_discovery: true,
            connect: ConnectOptions::default(),
        }
    }
}

/// Follow-up work for the manager after a radio event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirelessEffect {
    /// Link established, queued output can go
    Connected(RemoteId),
    /// Characteristic discovered; refresh and flush
    ServiceReady(RemoteId),
    /// Wire-format MIDI arrived from a known remote
    Notified { remote: RemoteId, data: Vec<u8> },
}

pub struct WirelessTransport {
    radio: Box<dyn RadioStack>,
    options: WirelessOptions,
    sink: SharedSink,
    scanning: bool,
}

impl WirelessTransport {
    pub fn new(radio: Box<dyn RadioStack>, options: WirelessOptions, sink: SharedSink) -> Self {
        Self {
            radio,
            options,
            sink,
            scanning: false,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn start_scanning(&mut self) -> Result<ScanOutcome, TransportError> {
        if !self.radio.is_powered_on() {
            return Err(TransportError::RadioUnavailable);
        }

        self.radio.scan(self.options.service)?;
        self.scanning = true;
        info!("Scanning for {}", self.options.service);
        Ok(ScanOutcome::Discovering)
    }

    pub fn stop_scanning(&mut self) {
        if self.scanning {
            self.radio.stop_scan();
            self.scanning = false;
            info!("Stopped scanning");
        }
    }

    fn session_of(
        &self,
        registry: &Registry,
        id: RemoteId,
    ) -> Result<SessionHandle, TransportError> {
        registry
            .find(id)
            .ok_or(TransportError::TargetNotFound(id))?
            .session
            .ok_or(TransportError::NoSession(id))
    }

    pub fn connect(&mut self, registry: &mut Registry, id: RemoteId) -> Result<(), TransportError> {
        let session = self.session_of(registry, id)?;
        debug!("Connecting to {} ({})", registry.destination_name(id), session);
        self.radio.connect(session, self.options.connect)?;
        Ok(())
    }

    pub fn disconnect(
        &mut self,
        registry: &mut Registry,
        id: RemoteId,
    ) -> Result<(), TransportError> {
        let session = self.session_of(registry, id)?;
        debug!("Cancelling {} ({})", registry.destination_name(id), session);
        self.radio.cancel_connection(session);
        Ok(())
    }

    /// Largest write the link accepts
    pub fn max_write_len(&self, session: SessionHandle) -> usize {
        self.radio.max_write_len(session)
    }

    /// Write one packed value to the MIDI characteristic
    pub fn write(&mut self, name: &str, session: SessionHandle, data: &[u8]) -> bool {
        match self.radio.write(session, data) {
            Ok(()) => true,
            Err(e) => {
                self.sink.record(Diagnostic::WriteFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn request_session(&mut self, name: &str, session: SessionHandle) {
        if let Err(e) = self.radio.connect(session, self.options.connect) {
            self.sink.record(Diagnostic::ConnectFailed {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }
    }

    pub fn handle_event(
        &mut self,
        registry: &mut Registry,
        event: RadioEvent,
    ) -> Option<WirelessEffect> {
        match event {
            RadioEvent::PowerStateChanged(power) => {
                info!("Bluetooth is {}", power);
                if !self.radio.is_powered_on() {
                    self.scanning = false;
                }
                None
            }

            RadioEvent::Discovered {
                id,
                name,
                advertised_name,
                session,
            } => {
                let id = registry.on_wireless_sighting(WirelessSighting {
                    id,
                    name,
                    advertised_name,
                    session,
                });
                let name = registry.destination_name(id);
                info!("Discovered {}", name);

                if self.options.auto_connect_on_discovery {
                    self.request_session(&name, session);
                }
                None
            }

            RadioEvent::Connected { session } => {
                let remote = match registry.find_by_session_mut(session) {
                    Some(remote) => remote,
                    None => {
                        debug!("Connected event for unknown {}", session);
                        return None;
                    }
                };
                remote.state = RemoteState::Connected;
                info!("Connected to {}", remote.name);
                Some(WirelessEffect::Connected(remote.id))
            }

            RadioEvent::FailedToConnect { session, error } => {
                let name = registry
                    .find_by_session(session)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| session.to_string());
                self.sink.record(Diagnostic::ConnectFailed {
                    name,
                    reason: error,
                });
                None
            }

            RadioEvent::Disconnected {
                session,
                error,
                is_reconnecting,
            } => {
                let remote = match registry.find_by_session_mut(session) {
                    Some(remote) => remote,
                    None => {
                        debug!("Disconnected event for unknown {}", session);
                        return None;
                    }
                };
                remote.state = RemoteState::Disconnected;
                let name = remote.name.clone();

                match error {
                    Some(reason) => {
                        self.sink.record(Diagnostic::LinkLost {
                            name: name.clone(),
                            reason,
                        });
                        if !is_reconnecting {
                            info!("Reconnecting to {}", name);
                            self.request_session(&name, session);
                        }
                    }
                    None => info!("Disconnected from {}", name),
                }
                None
            }

            RadioEvent::ServiceReady { session } => registry
                .find_by_session(session)
                .map(|r| WirelessEffect::ServiceReady(r.id)),

            RadioEvent::Notified { session, data } => match registry.find_by_session(session) {
                Some(remote) => Some(WirelessEffect::Notified {
                    remote: remote.id,
                    data,
                }),
                None => {
                    debug!("Notification from unknown {}", session);
                    None
                }
            },
        }
    }
}
