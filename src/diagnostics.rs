//! Diagnostics side channel
//!
//! Core components never fail loudly: every failure becomes a [`Diagnostic`]
//! recorded through the [`DiagnosticSink`] they were constructed with. The
//! binary forwards them to `tracing`; tests record them for inspection.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, warn};

use crate::remote::{EndpointRef, RemoteId};

/// Shared handle to a diagnostics sink
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// A failure reported by the codec, the registry, a transport or the manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("Invalid MIDI packet: {}", crate::midi::format_hex(.packet))]
    InvalidPacket { packet: Vec<u8> },

    #[error("Invalid MIDI packet status {status:#04X} at index {index} in {}", crate::midi::format_hex(.packet))]
    InvalidStatus {
        status: u8,
        index: usize,
        packet: Vec<u8>,
    },

    #[error("Encoded MIDI unit of {len} bytes exceeds the {max} byte write limit")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("Cannot connect to unknown peripheral with UUID: {0}")]
    CannotConnect(RemoteId),

    #[error("Cannot disconnect from unknown peripheral with UUID: {0}")]
    CannotDisconnect(RemoteId),

    #[error("Remote with ID {0} has no attached Bluetooth peripheral")]
    NoSession(RemoteId),

    #[error("No destination selected to send packets to")]
    NoDestination,

    #[error("Remote with ID {0} has neither a destination endpoint nor a Bluetooth peripheral")]
    UnusableDestination(RemoteId),

    #[error("Output buffer for {id} is full ({limit} events), dropped {dropped} events")]
    OutputBufferFull {
        id: RemoteId,
        limit: usize,
        dropped: usize,
    },

    #[error("Bluetooth is not available")]
    RadioUnavailable,

    #[error("Bluetooth failed to connect to {name}: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Bluetooth got disconnected from {name} with error: {reason}")]
    LinkLost { name: String, reason: String },

    #[error("Failed to write MIDI data to {name}: {reason}")]
    WriteFailed { name: String, reason: String },

    #[error("Failed to send MIDI to endpoint {endpoint}: {reason}")]
    HostSendFailed { endpoint: EndpointRef, reason: String },

    #[error("Failed to subscribe to MIDI source {endpoint}: {reason}")]
    SubscribeFailed { endpoint: EndpointRef, reason: String },

    #[error("MIDI enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Name '{name}' matches {count} remotes, merging into {id}")]
    AmbiguousName {
        name: String,
        count: usize,
        id: RemoteId,
    },
}

/// Severity a diagnostic is reported with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::RadioUnavailable
            | Diagnostic::ConnectFailed { .. }
            | Diagnostic::LinkLost { .. }
            | Diagnostic::AmbiguousName { .. }
            | Diagnostic::OutputBufferFull { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Receiver of diagnostics
///
/// Implementations must be callable from any thread.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Sink forwarding every diagnostic to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => warn!("{}", diagnostic),
            Severity::Error => error!("{}", diagnostic),
        }
    }
}

/// Sink keeping every diagnostic in memory, optionally forwarding to another sink
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Diagnostic>>,
    forward: Option<SharedSink>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and also forward to `sink`
    pub fn forwarding(sink: SharedSink) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            forward: Some(sink),
        }
    }

    /// Copy of everything recorded so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: Diagnostic) {
        if let Some(forward) = &self.forward {
            forward.record(diagnostic.clone());
        }
        self.entries.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.record(Diagnostic::NoDestination);
        sink.record(Diagnostic::RadioUnavailable);

        assert_eq!(
            sink.entries(),
            vec![Diagnostic::NoDestination, Diagnostic::RadioUnavailable]
        );
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_forwarding_sink_records_both() {
        let inner = Arc::new(RecordingSink::new());
        let outer = RecordingSink::forwarding(inner.clone());
        outer.record(Diagnostic::NoDestination);

        assert_eq!(outer.len(), 1);
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_diagnostic_messages() {
        let diag = Diagnostic::InvalidStatus {
            status: 0x05,
            index: 2,
            packet: vec![0x00, 0x00, 0x05, 0x22, 0x79],
        };
        assert_eq!(
            diag.to_string(),
            "Invalid MIDI packet status 0x05 at index 2 in 00 00 05 22 79"
        );
        assert_eq!(
            Diagnostic::NoDestination.to_string(),
            "No destination selected to send packets to"
        );
        assert_eq!(Diagnostic::RadioUnavailable.severity(), Severity::Warning);
    }
}
