//! Communication manager
//!
//! Orchestrates the registry, the active transport and the host MIDI
//! subsystem, and exposes send/receive, destination selection and output
//! buffering to the presentation layer.
//!
//! [`CommunicationManager`] is plain owned state. [`ManagerActor`] owns it on a
//! tokio task and [`ManagerHandle`] marshals every mutation onto that task,
//! including radio and host callbacks arriving on foreign threads.

mod actor;
mod actor_handle;
mod commands;

pub use actor::ManagerActor;
pub use actor_handle::ManagerHandle;
pub use commands::{InboundListener, ManagerCommand};

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::catalog::MessageCatalog;
use crate::codec::{pack_units, MessageCodec, DEFAULT_MAX_CHUNK_SIZE};
use crate::diagnostics::{Diagnostic, SharedSink};
use crate::host::{HostMidi, HostNotification};
use crate::midi::UniversalMessage;
use crate::radio::RadioEvent;
use crate::registry::Registry;
use crate::remote::{EndpointRef, RemoteDetails, RemoteId, RemoteState};
use crate::transport::{ScanOutcome, Transport, TransportError, TransportKind, WirelessEffect};

/// Output tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Queued events per destination, 0 for no bound
    pub buffer_limit: usize,
    /// Upper bound for one radio write, on top of the link's own limit
    pub max_chunk_size: usize,
    /// Timestamp advance between events of one wireless batch, 0 keeps one stamp
    pub timestamp_step_ms: u64,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            buffer_limit: 4096,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            timestamp_step_ms: 0,
        }
    }
}

/// One batch of inbound messages, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundBatch {
    pub source: String,
    pub messages: Vec<String>,
}

/// Everything the presentation layer reads
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub transport: TransportKind,
    pub remotes: Vec<RemoteDetails>,
    pub selected_destination: Option<RemoteId>,
    pub last_source: Option<String>,
    pub last_messages: Vec<String>,
    pub is_scanning: bool,
}

pub struct CommunicationManager {
    registry: Registry,
    transport: Transport,
    host: Box<dyn HostMidi>,
    codec: MessageCodec,
    sink: SharedSink,
    options: ManagerOptions,
    selected_destination: Option<RemoteId>,
    last_source: Option<String>,
    last_messages: Vec<String>,
    output_buffer: HashMap<RemoteId, VecDeque<u32>>,
    listeners: Vec<InboundListener>,
    started: Instant,
}

impl CommunicationManager {
    pub fn new(
        transport: Transport,
        host: Box<dyn HostMidi>,
        catalog: MessageCatalog,
        sink: SharedSink,
        options: ManagerOptions,
    ) -> Self {
        Self {
            registry: Registry::new(catalog.clone(), sink.clone()),
            transport,
            host,
            codec: MessageCodec::new(catalog, sink.clone()),
            sink,
            options,
            selected_destination: None,
            last_source: None,
            last_messages: Vec::new(),
            output_buffer: HashMap::new(),
            listeners: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn remotes(&self) -> &[RemoteDetails] {
        self.registry.remotes()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn selected_destination(&self) -> Option<RemoteId> {
        self.selected_destination
    }

    pub fn last_source(&self) -> Option<&str> {
        self.last_source.as_deref()
    }

    pub fn last_messages(&self) -> &[String] {
        &self.last_messages
    }

    pub fn is_scanning(&self) -> bool {
        self.transport.is_scanning()
    }

    /// Events queued for `id` and not flushed yet
    pub fn output_buffer(&self, id: RemoteId) -> Vec<u32> {
        self.output_buffer
            .get(&id)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            transport: self.transport.kind(),
            remotes: self.registry.remotes().to_vec(),
            selected_destination: self.selected_destination,
            last_source: self.last_source.clone(),
            last_messages: self.last_messages.clone(),
            is_scanning: self.transport.is_scanning(),
        }
    }

    pub fn add_listener(&mut self, listener: InboundListener) {
        self.listeners.push(listener);
    }

    pub(crate) fn host_mut(&mut self) -> &mut dyn HostMidi {
        self.host.as_mut()
    }

    // ---------------------------------------------------------------------
    // Discovery
    // ---------------------------------------------------------------------

    /// Re-enumerate the host MIDI setup and reconcile it into the registry
    pub fn refresh(&mut self) {
        let snapshot = match self.host.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.sink.record(Diagnostic::EnumerationFailed(e.to_string()));
                return;
            }
        };

        let changes = self.registry.reconcile_host(&snapshot);
        for endpoint in changes.unsubscribe {
            if let Err(e) = self.host.unsubscribe(endpoint) {
                debug!("Unsubscribing {} failed: {}", endpoint, e);
            }
        }
        for endpoint in changes.subscribe {
            self.subscribe_source(endpoint);
        }
        debug!("Refreshed, {} remotes known", self.registry.len());

        self.flush_all();
    }

    pub fn start_scanning(&mut self) {
        match self.transport.start_scanning() {
            Ok(ScanOutcome::Refresh) => self.refresh(),
            Ok(ScanOutcome::Discovering) => {}
            Err(TransportError::RadioUnavailable) => self.sink.record(Diagnostic::RadioUnavailable),
            Err(e) => self.sink.record(Diagnostic::ConnectFailed {
                name: self.transport.kind().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn stop_scanning(&mut self) {
        self.transport.stop_scanning();
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Start receiving from a remote, requesting a session when needed
    pub fn connect(&mut self, id: RemoteId) {
        let Some(remote) = self.registry.find(id) else {
            self.sink.record(Diagnostic::CannotConnect(id));
            return;
        };
        let name = remote.name.clone();
        let source = remote.source;

        if remote.state != RemoteState::Connected {
            match self.transport.connect(&mut self.registry, id) {
                Ok(()) => {}
                Err(TransportError::NoSession(_)) => {
                    debug!("{} has no radio session, host endpoints only", name);
                }
                Err(TransportError::RadioUnavailable) => {
                    self.sink.record(Diagnostic::RadioUnavailable)
                }
                Err(TransportError::TargetNotFound(_)) => {
                    self.sink.record(Diagnostic::CannotConnect(id))
                }
                Err(TransportError::Radio(e)) => self.sink.record(Diagnostic::ConnectFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if let Some(source) = source {
            self.subscribe_source(source);
        }
        if let Some(remote) = self.registry.find_mut(id) {
            remote.enable_reception = true;
        }
        info!("Receiving from {}", name);

        self.flush(id);
    }

    /// Stop receiving from a remote; a radio session stays up
    pub fn disconnect(&mut self, id: RemoteId) {
        let Some(remote) = self.registry.find_mut(id) else {
            self.sink.record(Diagnostic::CannotDisconnect(id));
            return;
        };
        remote.enable_reception = false;
        let name = remote.name.clone();
        let source = remote.source;

        if let Some(source) = source {
            if let Err(e) = self.host.unsubscribe(source) {
                debug!("Unsubscribing {} failed: {}", source, e);
            }
        }
        if let Err(e) = self.transport.release(&mut self.registry, id) {
            debug!("Releasing {} failed: {}", name, e);
        }
        info!("Stopped receiving from {}", name);
    }

    /// Tear down the transport session with a remote
    pub fn cancel_session(&mut self, id: RemoteId) {
        match self.transport.disconnect(&mut self.registry, id) {
            Ok(()) => {}
            Err(TransportError::TargetNotFound(_)) => {
                self.sink.record(Diagnostic::CannotDisconnect(id))
            }
            Err(TransportError::NoSession(_)) => self.sink.record(Diagnostic::NoSession(id)),
            Err(e) => debug!("Cancelling session failed: {}", e),
        }
    }

    fn subscribe_source(&mut self, endpoint: EndpointRef) {
        if let Err(e) = self.host.subscribe(endpoint) {
            self.sink.record(Diagnostic::SubscribeFailed {
                endpoint,
                reason: e.to_string(),
            });
        }
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    /// Choose where `send` delivers; `None` clears the selection
    pub fn select_destination(&mut self, id: Option<RemoteId>) {
        let Some(id) = id else {
            self.selected_destination = None;
            return;
        };

        match self.registry.find(id) {
            Some(remote) if remote.has_usable_destination() => {
                info!("Sending to {}", remote.name);
                self.selected_destination = Some(id);
                self.flush(id);
            }
            _ => self.sink.record(Diagnostic::UnusableDestination(id)),
        }
    }

    /// Queue packed events for the selected destination and flush what can go
    pub fn send(&mut self, events: &[u32]) {
        if events.is_empty() {
            return;
        }
        let Some(id) = self.selected_destination else {
            self.sink.record(Diagnostic::NoDestination);
            return;
        };

        let limit = self.options.buffer_limit;
        let queue = self.output_buffer.entry(id).or_default();
        let room = if limit == 0 {
            events.len()
        } else {
            limit.saturating_sub(queue.len()).min(events.len())
        };
        queue.extend(&events[..room]);

        if room < events.len() {
            self.sink.record(Diagnostic::OutputBufferFull {
                id,
                limit,
                dropped: events.len() - room,
            });
        }

        self.flush(id);
    }

    fn flush_all(&mut self) {
        let pending: Vec<RemoteId> = self
            .output_buffer
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(id, _)| *id)
            .collect();
        for id in pending {
            self.flush(id);
        }
    }

    /// Deliver queued events to `id` if a path is ready
    ///
    /// The host destination endpoint wins over the radio link. Without a
    /// ready path the events stay queued.
    fn flush(&mut self, id: RemoteId) {
        if self.output_buffer.get(&id).map_or(true, VecDeque::is_empty) {
            return;
        }
        let Some(remote) = self.registry.find(id).cloned() else {
            return;
        };

        if let Some(destination) = remote.destination {
            let events = self.take_pending(id);
            if let Err(e) = self.host.send(destination, &events) {
                self.sink.record(Diagnostic::HostSendFailed {
                    endpoint: destination,
                    reason: e.to_string(),
                });
            }
            trace!("Sent {} events to {}", events.len(), remote.name);
            return;
        }

        let (Some(session), true) = (remote.session, remote.is_connected()) else {
            trace!("{} not ready, keeping events queued", remote.name);
            return;
        };
        let Some(wireless) = self.transport.as_wireless_mut() else {
            return;
        };

        let events: Vec<u32> = self
            .output_buffer
            .get_mut(&id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();
        let max = wireless
            .max_write_len(session)
            .min(self.options.max_chunk_size);
        let elapsed_ns = self.started.elapsed().as_nanos() as u64;

        let units = if self.options.timestamp_step_ms == 0 {
            self.codec.encode(&events, max, elapsed_ns)
        } else {
            let step_ns = self.options.timestamp_step_ms.saturating_mul(1_000_000);
            events
                .iter()
                .enumerate()
                .flat_map(|(i, event)| {
                    let stamp = elapsed_ns.wrapping_add((i as u64).wrapping_mul(step_ns));
                    self.codec.encode(std::slice::from_ref(event), max, stamp)
                })
                .collect()
        };

        // One unit per event, so unit lengths tell how many events a write carried
        let unit_lens: Vec<usize> = units.iter().map(Vec::len).collect();
        let mut unit_lens = unit_lens.into_iter();
        let mut delivered = 0;
        for write in pack_units(units, max) {
            if !wireless.write(&remote.name, session, &write) {
                break;
            }
            let mut written = 0;
            while written < write.len() {
                let Some(len) = unit_lens.next() else {
                    break;
                };
                written += len;
                delivered += 1;
            }
        }

        if delivered < events.len() {
            let queue = self.output_buffer.entry(id).or_default();
            for &event in events[delivered..].iter().rev() {
                queue.push_front(event);
            }
            debug!(
                "Kept {} unsent events for {}",
                events.len() - delivered,
                remote.name
            );
        }
        trace!("Wrote {} events to {}", delivered, remote.name);
    }

    fn take_pending(&mut self, id: RemoteId) -> Vec<u32> {
        self.output_buffer
            .get_mut(&id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Input
    // ---------------------------------------------------------------------

    /// Replace the last inbound batch with events from a host source
    ///
    /// Batches with nothing displayable (clock, active sensing) are dropped.
    pub fn receive(&mut self, source: Option<EndpointRef>, events: &[UniversalMessage]) {
        let messages: Vec<String> = events
            .iter()
            .filter_map(|event| self.codec.decode_message(event))
            .collect();
        if messages.is_empty() {
            return;
        }
        let source = self.registry.describe_source(source);
        self.publish(source, messages);
    }

    /// Replace the last inbound batch with a wire buffer from a radio link
    ///
    /// Remotes that also have a host source are heard through the host.
    pub fn receive_wire(&mut self, id: RemoteId, data: &[u8]) {
        let Some(remote) = self.registry.find(id) else {
            return;
        };
        if !remote.enable_reception {
            trace!("Ignoring radio data from {}, reception disabled", remote.name);
            return;
        }
        if remote.source.is_some() {
            trace!("Ignoring radio data from {}, host source attached", remote.name);
            return;
        }
        let source = remote.name.clone();
        let messages = self.codec.decode_wire(data);
        if messages.is_empty() {
            return;
        }
        self.publish(source, messages);
    }

    fn publish(&mut self, source: String, messages: Vec<String>) {
        let batch = InboundBatch { source, messages };
        for listener in &self.listeners {
            listener(&batch);
        }
        self.last_source = Some(batch.source);
        self.last_messages = batch.messages;
    }

    // ---------------------------------------------------------------------
    // Callbacks
    // ---------------------------------------------------------------------

    pub fn handle_radio_event(&mut self, event: RadioEvent) {
        match self.transport.handle_radio_event(&mut self.registry, event) {
            Some(WirelessEffect::Connected(id)) => self.flush(id),
            Some(WirelessEffect::ServiceReady(id)) => {
                self.refresh();
                self.flush(id);
            }
            Some(WirelessEffect::Notified { remote, data }) => self.receive_wire(remote, &data),
            None => {}
        }
    }

    pub fn handle_host_notification(&mut self, notification: HostNotification) {
        if notification.requires_refresh() {
            debug!("Host MIDI setup changed ({:?})", notification);
            self.refresh();
        } else {
            trace!("Ignoring host notification {:?}", notification);
        }
    }
}
