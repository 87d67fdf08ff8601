//! ManagerActor - single owner of the communication manager
//!
//! Radio callbacks, host MIDI input (delivered on the backend's own thread)
//! and presentation requests all arrive as [`ManagerCommand`]s and are
//! applied one at a time on the actor task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::actor_handle::ManagerHandle;
use super::commands::ManagerCommand;
use super::CommunicationManager;

pub struct ManagerActor {
    manager: CommunicationManager,
    command_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    processed: u64,
}

impl ManagerActor {
    /// Spawn the actor on the current tokio runtime and return its handle
    ///
    /// Inbound host MIDI is routed through the handle, so the host callback
    /// never touches the manager directly.
    pub fn spawn(mut manager: CommunicationManager) -> ManagerHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let inbound_tx = cmd_tx.clone();
        manager
            .host_mut()
            .set_inbound_callback(Arc::new(move |source, events| {
                let _ = inbound_tx.send(ManagerCommand::Receive {
                    source: Some(source),
                    events,
                });
            }));

        let actor = ManagerActor {
            manager,
            command_rx: cmd_rx,
            processed: 0,
        };
        tokio::spawn(actor.run());

        info!("ManagerActor spawned");
        ManagerHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("ManagerActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");
            self.processed += 1;

            match cmd {
                ManagerCommand::Refresh => self.manager.refresh(),
                ManagerCommand::StartScanning => self.manager.start_scanning(),
                ManagerCommand::StopScanning => self.manager.stop_scanning(),
                ManagerCommand::Connect(id) => self.manager.connect(id),
                ManagerCommand::Disconnect(id) => self.manager.disconnect(id),
                ManagerCommand::CancelSession(id) => self.manager.cancel_session(id),
                ManagerCommand::SelectDestination(id) => self.manager.select_destination(id),
                ManagerCommand::Send(events) => self.manager.send(&events),
                ManagerCommand::AddListener(listener) => self.manager.add_listener(listener),

                ManagerCommand::Radio(event) => self.manager.handle_radio_event(event),
                ManagerCommand::Host(notification) => {
                    self.manager.handle_host_notification(notification)
                }
                ManagerCommand::Receive { source, events } => {
                    self.manager.receive(source, &events)
                }

                ManagerCommand::Snapshot { response } => {
                    let _ = response.send(self.manager.snapshot());
                }
                ManagerCommand::OutputBuffer { id, response } => {
                    let _ = response.send(self.manager.output_buffer(id));
                }

                ManagerCommand::Shutdown => {
                    info!("ManagerActor received shutdown command");
                    break;
                }
            }
        }

        self.manager.stop_scanning();
        info!(processed = self.processed, "ManagerActor run loop terminated");
    }
}
