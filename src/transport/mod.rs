//! Transport adapters
//!
//! One capability contract (scan, connect, disconnect) over the closed set of
//! ways a remote can be reached: the local host enumeration and the wireless
//! radio link. The manager owns exactly one [`Transport`].

mod local;
mod wireless;

pub use local::LocalTransport;
pub use wireless::{WirelessEffect, WirelessOptions, WirelessTransport};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::radio::{RadioError, RadioEvent};
use crate::registry::Registry;
use crate::remote::RemoteId;

/// Transport failures, turned into diagnostics by the manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("remote {0} not found")]
    TargetNotFound(RemoteId),

    #[error("remote {0} has no radio session")]
    NoSession(RemoteId),

    #[error("radio unavailable")]
    RadioUnavailable,

    #[error(transparent)]
    Radio(#[from] RadioError),
}

/// What the manager must do after a scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Discovery runs in the background and reports through callbacks
    Discovering,
    /// Scanning is a host enumeration pass
    Refresh,
}

/// Which transport variant is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Local,
    Wireless,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Wireless => write!(f, "wireless"),
        }
    }
}

pub enum Transport {
    Local(LocalTransport),
    Wireless(WirelessTransport),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Local(_) => TransportKind::Local,
            Transport::Wireless(_) => TransportKind::Wireless,
        }
    }

    pub fn is_scanning(&self) -> bool {
        match self {
            Transport::Local(t) => t.is_scanning(),
            Transport::Wireless(t) => t.is_scanning(),
        }
    }

    pub fn start_scanning(&mut self) -> Result<ScanOutcome, TransportError> {
        match self {
            Transport::Local(t) => Ok(t.start_scanning()),
            Transport::Wireless(t) => t.start_scanning(),
        }
    }

    /// Idempotent
    pub fn stop_scanning(&mut self) {
        match self {
            Transport::Local(t) => t.stop_scanning(),
            Transport::Wireless(t) => t.stop_scanning(),
        }
    }

    /// Request a session with a known remote
    pub fn connect(&mut self, registry: &mut Registry, id: RemoteId) -> Result<(), TransportError> {
        match self {
            Transport::Local(t) => t.connect(registry, id),
            Transport::Wireless(t) => t.connect(registry, id),
        }
    }

    /// End the logical connection without cancelling a radio session
    ///
    /// The local transport has no session, so this is its disconnect.
    pub fn release(&mut self, registry: &mut Registry, id: RemoteId) -> Result<(), TransportError> {
        match self {
            Transport::Local(t) => t.disconnect(registry, id),
            Transport::Wireless(_) => Ok(()),
        }
    }

    /// Tear down the session with a remote; idempotent
    pub fn disconnect(
        &mut self,
        registry: &mut Registry,
        id: RemoteId,
    ) -> Result<(), TransportError> {
        match self {
            Transport::Local(t) => t.disconnect(registry, id),
            Transport::Wireless(t) => t.disconnect(registry, id),
        }
    }

    /// Apply a radio callback; the local transport has no radio
    pub fn handle_radio_event(
        &mut self,
        registry: &mut Registry,
        event: RadioEvent,
    ) -> Option<WirelessEffect> {
        match self {
            Transport::Local(_) => {
                debug!("Ignoring radio event on local transport: {:?}", event);
                None
            }
            Transport::Wireless(t) => t.handle_event(registry, event),
        }
    }

    pub fn as_wireless_mut(&mut self) -> Option<&mut WirelessTransport> {
        match self {
            Transport::Wireless(t) => Some(t),
            Transport::Local(_) => None,
        }
    }
}
