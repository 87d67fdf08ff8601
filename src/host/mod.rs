//! Host MIDI enumeration boundary
//!
//! The operating system's MIDI subsystem lists sources, destinations and
//! external devices by name. [`HostMidi`] is the contract the manager
//! consumes; [`StaticHost`] serves fixed sample devices and [`MidirHost`]
//! enumerates the live ports through midir.

mod midir_host;

pub use midir_host::MidirHost;

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::midi::UniversalMessage;
use crate::remote::EndpointRef;

/// Callback for inbound host MIDI: source endpoint and the decoded events
pub type InboundCallback = Arc<dyn Fn(EndpointRef, Vec<UniversalMessage>) + Send + Sync>;

/// Named host endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    pub name: String,
    pub endpoint: EndpointRef,
}

/// External device known to the host setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDevice {
    pub name: String,
    /// Handle used for both directions
    pub endpoint: EndpointRef,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

/// Everything the host reported in one enumeration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSnapshot {
    pub sources: Vec<HostEndpoint>,
    pub destinations: Vec<HostEndpoint>,
    pub external_devices: Vec<HostDevice>,
}

/// Change notification from the host MIDI setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostNotification {
    SetupChanged,
    ObjectAdded,
    ObjectRemoved,
    PropertyChanged,
}

impl HostNotification {
    /// Whether the notification requires a new enumeration pass
    pub fn requires_refresh(&self) -> bool {
        !matches!(self, HostNotification::PropertyChanged)
    }
}

/// Host MIDI failures
#[derive(Debug, Error)]
pub enum HostError {
    #[error("MIDI endpoint {0} not found")]
    EndpointNotFound(EndpointRef),

    #[error("MIDI backend error: {0}")]
    Backend(String),
}

/// Host MIDI subsystem as seen by the manager
pub trait HostMidi: Send {
    fn sources(&self) -> Result<Vec<HostEndpoint>, HostError>;

    fn destinations(&self) -> Result<Vec<HostEndpoint>, HostError>;

    fn external_devices(&self) -> Result<Vec<HostDevice>, HostError>;

    /// Enumerate everything at once
    fn snapshot(&self) -> Result<HostSnapshot, HostError> {
        Ok(HostSnapshot {
            sources: self.sources()?,
            destinations: self.destinations()?,
            external_devices: self.external_devices()?,
        })
    }

    /// Start delivering inbound messages from `source`; subscribing twice is a no-op
    fn subscribe(&mut self, source: EndpointRef) -> Result<(), HostError>;

    /// Stop delivering inbound messages from `source`; unknown sources are ignored
    fn unsubscribe(&mut self, source: EndpointRef) -> Result<(), HostError>;

    /// Send packed events to `destination`
    fn send(&mut self, destination: EndpointRef, events: &[u32]) -> Result<(), HostError>;

    /// Install the callback receiving inbound messages
    fn set_inbound_callback(&mut self, callback: InboundCallback);
}

#[derive(Default)]
struct StaticState {
    snapshot: HostSnapshot,
    subscribed: BTreeSet<EndpointRef>,
    sent: Vec<(EndpointRef, Vec<u32>)>,
    fail_sends: bool,
    callback: Option<InboundCallback>,
}

/// In-memory host with a fixed device list
///
/// Clones share state, so a test can keep one clone to inspect subscriptions
/// and sent events after handing the other to the manager.
#[derive(Clone, Default)]
pub struct StaticHost {
    state: Arc<Mutex<StaticState>>,
}

impl StaticHost {
    pub fn new(snapshot: HostSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(StaticState {
                snapshot,
                ..Default::default()
            })),
        }
    }

    /// Three sample remotes, the third one with device metadata
    pub fn samples() -> Self {
        let endpoint = |name: &str, endpoint: u32| HostEndpoint {
            name: name.to_string(),
            endpoint: EndpointRef(endpoint),
        };

        Self::new(HostSnapshot {
            sources: vec![
                endpoint("Remote 1", 125),
                endpoint("Remote 2", 317),
                endpoint("Remote 3", 794),
            ],
            destinations: vec![
                endpoint("Remote 1", 126),
                endpoint("Remote 2", 429),
                endpoint("Remote 3", 331),
            ],
            external_devices: vec![HostDevice {
                name: "Remote 3".to_string(),
                endpoint: EndpointRef(794),
                manufacturer: Some("Tester".to_string()),
                model: Some("Device".to_string()),
            }],
        })
    }

    /// Replace the device list, as a hot-plug would
    pub fn set_snapshot(&self, snapshot: HostSnapshot) {
        self.state.lock().snapshot = snapshot;
    }

    pub fn subscribed(&self) -> Vec<EndpointRef> {
        self.state.lock().subscribed.iter().copied().collect()
    }

    pub fn sent(&self) -> Vec<(EndpointRef, Vec<u32>)> {
        self.state.lock().sent.clone()
    }

    /// Make every following send fail
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Deliver inbound events as if `source` had produced them
    ///
    /// Only subscribed sources are delivered; returns whether it was.
    pub fn inject(&self, source: EndpointRef, events: Vec<UniversalMessage>) -> bool {
        let callback = {
            let state = self.state.lock();
            if !state.subscribed.contains(&source) {
                return false;
            }
            state.callback.clone()
        };

        match callback {
            Some(callback) => {
                callback(source, events);
                true
            }
            None => false,
        }
    }

    fn has_destination(&self, endpoint: EndpointRef) -> bool {
        let state = self.state.lock();
        state.snapshot.destinations.iter().any(|d| d.endpoint == endpoint)
            || state
                .snapshot
                .external_devices
                .iter()
                .any(|d| d.endpoint == endpoint)
    }
}

impl HostMidi for StaticHost {
    fn sources(&self) -> Result<Vec<HostEndpoint>, HostError> {
        Ok(self.state.lock().snapshot.sources.clone())
    }

    fn destinations(&self) -> Result<Vec<HostEndpoint>, HostError> {
        Ok(self.state.lock().snapshot.destinations.clone())
    }

    fn external_devices(&self) -> Result<Vec<HostDevice>, HostError> {
        Ok(self.state.lock().snapshot.external_devices.clone())
    }

    fn subscribe(&mut self, source: EndpointRef) -> Result<(), HostError> {
        self.state.lock().subscribed.insert(source);
        Ok(())
    }

    fn unsubscribe(&mut self, source: EndpointRef) -> Result<(), HostError> {
        self.state.lock().subscribed.remove(&source);
        Ok(())
    }

    fn send(&mut self, destination: EndpointRef, events: &[u32]) -> Result<(), HostError> {
        if !self.has_destination(destination) {
            return Err(HostError::EndpointNotFound(destination));
        }

        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(HostError::Backend("send rejected".to_string()));
        }
        state.sent.push((destination, events.to_vec()));
        Ok(())
    }

    fn set_inbound_callback(&mut self, callback: InboundCallback) {
        self.state.lock().callback = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_snapshot() {
        let host = StaticHost::samples();
        let snapshot = host.snapshot().unwrap();

        assert_eq!(snapshot.sources.len(), 3);
        assert_eq!(snapshot.destinations[1].endpoint, EndpointRef(429));
        assert_eq!(
            snapshot.external_devices[0].manufacturer.as_deref(),
            Some("Tester")
        );
    }

    #[test]
    fn test_send_to_unknown_destination_fails() {
        let mut host = StaticHost::samples();
        let err = host.send(EndpointRef(1), &[0x2090_3C7F]).unwrap_err();

        assert!(matches!(err, HostError::EndpointNotFound(EndpointRef(1))));
        assert!(host.sent().is_empty());

        host.send(EndpointRef(126), &[0x2090_3C7F]).unwrap();
        assert_eq!(host.sent(), vec![(EndpointRef(126), vec![0x2090_3C7F])]);
    }

    #[test]
    fn test_inject_requires_subscription() {
        let mut host = StaticHost::samples();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        host.set_inbound_callback(Arc::new(move |source, events| {
            sink.lock().push((source, events.len()));
        }));

        assert!(!host.inject(EndpointRef(125), vec![UniversalMessage::Utility]));

        host.subscribe(EndpointRef(125)).unwrap();
        host.subscribe(EndpointRef(125)).unwrap();
        assert!(host.inject(EndpointRef(125), vec![UniversalMessage::Utility]));
        assert_eq!(host.subscribed(), vec![EndpointRef(125)]);

        host.unsubscribe(EndpointRef(125)).unwrap();
        assert!(!host.inject(EndpointRef(125), vec![UniversalMessage::Utility]));
        assert_eq!(received.lock().as_slice(), &[(EndpointRef(125), 1)]);
    }

    #[test]
    fn test_property_change_does_not_refresh() {
        assert!(HostNotification::SetupChanged.requires_refresh());
        assert!(HostNotification::ObjectRemoved.requires_refresh());
        assert!(!HostNotification::PropertyChanged.requires_refresh());
    }
}
