//! Commands processed by the manager actor

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{InboundBatch, ManagerSnapshot};
use crate::host::HostNotification;
use crate::midi::UniversalMessage;
use crate::radio::RadioEvent;
use crate::remote::{EndpointRef, RemoteId};

/// Listener for inbound batches; runs on the actor task
pub type InboundListener = Arc<dyn Fn(&InboundBatch) + Send + Sync>;

/// Commands for the manager actor
///
/// Everything except the queries is fire-and-forget. Commands are processed
/// in order, so a query observes every command sent before it.
pub enum ManagerCommand {
    // -------------------------------------------------------------------------
    // Presentation requests
    // -------------------------------------------------------------------------
    Refresh,
    StartScanning,
    StopScanning,
    Connect(RemoteId),
    Disconnect(RemoteId),
    CancelSession(RemoteId),
    SelectDestination(Option<RemoteId>),
    Send(Vec<u32>),
    AddListener(InboundListener),

    // -------------------------------------------------------------------------
    // Callbacks marshaled from other threads
    // -------------------------------------------------------------------------
    Radio(RadioEvent),
    Host(HostNotification),
    Receive {
        source: Option<EndpointRef>,
        events: Vec<UniversalMessage>,
    },

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------
    Snapshot {
        response: oneshot::Sender<ManagerSnapshot>,
    },
    OutputBuffer {
        id: RemoteId,
        response: oneshot::Sender<Vec<u32>>,
    },

    Shutdown,
}

impl std::fmt::Debug for ManagerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerCommand::Refresh => write!(f, "Refresh"),
            ManagerCommand::StartScanning => write!(f, "StartScanning"),
            ManagerCommand::StopScanning => write!(f, "StopScanning"),
            ManagerCommand::Connect(id) => f.debug_tuple("Connect").field(id).finish(),
            ManagerCommand::Disconnect(id) => f.debug_tuple("Disconnect").field(id).finish(),
            ManagerCommand::CancelSession(id) => {
                f.debug_tuple("CancelSession").field(id).finish()
            }
            ManagerCommand::SelectDestination(id) => {
                f.debug_tuple("SelectDestination").field(id).finish()
            }
            ManagerCommand::Send(events) => f
                .debug_struct("Send")
                .field("events_count", &events.len())
                .finish(),
            ManagerCommand::AddListener(_) => {
                f.debug_struct("AddListener").finish_non_exhaustive()
            }
            ManagerCommand::Radio(event) => f.debug_tuple("Radio").field(event).finish(),
            ManagerCommand::Host(notification) => {
                f.debug_tuple("Host").field(notification).finish()
            }
            ManagerCommand::Receive { source, events } => f
                .debug_struct("Receive")
                .field("source", source)
                .field("events_count", &events.len())
                .finish(),
            ManagerCommand::Snapshot { .. } => f.debug_struct("Snapshot").finish_non_exhaustive(),
            ManagerCommand::OutputBuffer { id, .. } => f
                .debug_struct("OutputBuffer")
                .field("id", id)
                .finish_non_exhaustive(),
            ManagerCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_payloads() {
        let cmd = ManagerCommand::Send(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", cmd), "Send { events_count: 3 }");

        let cmd = ManagerCommand::Shutdown;
        assert_eq!(format!("{:?}", cmd), "Shutdown");
    }
}
