//! ManagerHandle - public API for the ManagerActor
//!
//! Fire-and-forget methods for requests and callbacks, async methods with
//! oneshot channels for queries. The handle is cheap to clone and can be
//! moved into radio or host callbacks running on other threads.

use tokio::sync::{mpsc, oneshot};

use super::commands::{InboundListener, ManagerCommand};
use super::ManagerSnapshot;
use crate::host::HostNotification;
use crate::midi::UniversalMessage;
use crate::radio::RadioEvent;
use crate::remote::{EndpointRef, RemoteId};

#[derive(Clone)]
pub struct ManagerHandle {
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl ManagerHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<ManagerCommand>) -> Self {
        Self { cmd_tx }
    }

    fn post(&self, cmd: ManagerCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    // =========================================================================
    // Requests (fire-and-forget)
    // =========================================================================

    pub fn refresh(&self) {
        self.post(ManagerCommand::Refresh);
    }

    pub fn start_scanning(&self) {
        self.post(ManagerCommand::StartScanning);
    }

    pub fn stop_scanning(&self) {
        self.post(ManagerCommand::StopScanning);
    }

    pub fn connect(&self, id: RemoteId) {
        self.post(ManagerCommand::Connect(id));
    }

    pub fn disconnect(&self, id: RemoteId) {
        self.post(ManagerCommand::Disconnect(id));
    }

    pub fn cancel_session(&self, id: RemoteId) {
        self.post(ManagerCommand::CancelSession(id));
    }

    pub fn select_destination(&self, id: Option<RemoteId>) {
        self.post(ManagerCommand::SelectDestination(id));
    }

    /// Queue packed events for the selected destination
    pub fn send(&self, events: Vec<u32>) {
        self.post(ManagerCommand::Send(events));
    }

    /// Register a listener called with every inbound batch
    pub fn add_listener(&self, listener: InboundListener) {
        self.post(ManagerCommand::AddListener(listener));
    }

    // =========================================================================
    // Callbacks (fire-and-forget, callable from any thread)
    // =========================================================================

    pub fn radio_event(&self, event: RadioEvent) {
        self.post(ManagerCommand::Radio(event));
    }

    pub fn host_notification(&self, notification: HostNotification) {
        self.post(ManagerCommand::Host(notification));
    }

    pub fn receive(&self, source: Option<EndpointRef>, events: Vec<UniversalMessage>) {
        self.post(ManagerCommand::Receive { source, events });
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state, after every command sent before this call
    ///
    /// Returns `None` once the actor has stopped.
    pub async fn snapshot(&self) -> Option<ManagerSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCommand::Snapshot {
                response: response_tx,
            })
            .is_err()
        {
            return None;
        }
        response_rx.await.ok()
    }

    pub async fn output_buffer(&self, id: RemoteId) -> Vec<u32> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCommand::OutputBuffer {
                id,
                response: response_tx,
            })
            .is_err()
        {
            return Vec::new();
        }
        response_rx.await.unwrap_or_default()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub fn shutdown(&self) {
        self.post(ManagerCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_clone_and_send() {
        fn assert_clone_send<T: Clone + Send + Sync>() {}
        assert_clone_send::<ManagerHandle>();
    }

    #[tokio::test]
    async fn test_queries_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ManagerHandle::new(tx);

        assert!(!handle.is_alive());
        assert!(handle.snapshot().await.is_none());
        assert!(handle.output_buffer(RemoteId::new()).await.is_empty());
    }
}
