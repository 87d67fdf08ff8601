//! Remote registry and reconciliation
//!
//! Keeps one [`RemoteDetails`] per device and merges the facts reported by the
//! two discovery channels:
//!
//! - wireless sightings are keyed by the radio identifier
//! - host enumeration is keyed by exact name
//!
//! Entities are created on first sighting and never removed. Host
//! enumeration only attaches endpoints; connection state is owned by the
//! transports.

use tracing::debug;

use crate::catalog::MessageCatalog;
use crate::diagnostics::{Diagnostic, SharedSink};
use crate::host::{HostDevice, HostEndpoint, HostSnapshot};
use crate::remote::{EndpointRef, RemoteDetails, RemoteId, RemoteState, SessionHandle};

/// A peripheral reported by the radio stack during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessSighting {
    pub id: RemoteId,
    /// Peripheral name, if the radio knows one
    pub name: Option<String>,
    pub advertised_name: Option<String>,
    pub session: SessionHandle,
}

/// Source subscriptions a host reconciliation asks for
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceChanges {
    /// Sources newly attached to a remote with reception enabled
    pub subscribe: Vec<EndpointRef>,
    /// Sources such a remote no longer uses
    pub unsubscribe: Vec<EndpointRef>,
}

impl SourceChanges {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Which endpoint slot a host fact fills
#[derive(Debug, Clone, Copy)]
enum Slot {
    Source,
    Destination,
}

/// Store of every remote seen during this process lifetime
pub struct Registry {
    remotes: Vec<RemoteDetails>,
    catalog: MessageCatalog,
    sink: SharedSink,
}

impl Registry {
    pub fn new(catalog: MessageCatalog, sink: SharedSink) -> Self {
        Self {
            remotes: Vec::new(),
            catalog,
            sink,
        }
    }

    /// All remotes, in order of first sighting
    pub fn remotes(&self) -> &[RemoteDetails] {
        &self.remotes
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn find(&self, id: RemoteId) -> Option<&RemoteDetails> {
        self.remotes.iter().find(|r| r.id == id)
    }

    pub fn find_mut(&mut self, id: RemoteId) -> Option<&mut RemoteDetails> {
        self.remotes.iter_mut().find(|r| r.id == id)
    }

    pub fn find_by_source(&self, endpoint: EndpointRef) -> Option<&RemoteDetails> {
        self.remotes.iter().find(|r| r.source == Some(endpoint))
    }

    pub fn find_by_session(&self, session: SessionHandle) -> Option<&RemoteDetails> {
        self.remotes.iter().find(|r| r.session == Some(session))
    }

    pub fn find_by_session_mut(&mut self, session: SessionHandle) -> Option<&mut RemoteDetails> {
        self.remotes.iter_mut().find(|r| r.session == Some(session))
    }

    /// Record a wireless sighting
    ///
    /// A repeat sighting means the peripheral is advertising again, so the
    /// remote goes back to offline.
    pub fn on_wireless_sighting(&mut self, sighting: WirelessSighting) -> RemoteId {
        let name = sighting
            .name
            .unwrap_or_else(|| self.catalog.unknown_device.clone());

        if let Some(remote) = self.find_mut(sighting.id) {
            remote.name = name;
            remote.advertised_name = sighting.advertised_name;
            remote.session = Some(sighting.session);
            remote.state = RemoteState::Offline;
            return remote.id;
        }

        debug!("New wireless remote {} ({})", name, sighting.id);
        let mut remote = RemoteDetails::new(sighting.id, name);
        remote.advertised_name = sighting.advertised_name;
        remote.session = Some(sighting.session);
        self.remotes.push(remote);
        sighting.id
    }

    /// Merge a host enumeration snapshot
    ///
    /// Returns the subscription changes for remotes with reception enabled
    /// whose source endpoint was attached or replaced. Applying the same
    /// snapshot twice changes nothing and returns nothing the second time.
    pub fn reconcile_host(&mut self, snapshot: &HostSnapshot) -> SourceChanges {
        let mut changes = SourceChanges::default();

        for HostEndpoint { name, endpoint } in &snapshot.sources {
            self.attach(name, *endpoint, Slot::Source, &mut changes);
        }

        for HostEndpoint { name, endpoint } in &snapshot.destinations {
            self.attach(name, *endpoint, Slot::Destination, &mut changes);
        }

        for device in &snapshot.external_devices {
            if let Some(endpoint) = self.attach_device(device) {
                changes.subscribe.push(endpoint);
            }
        }

        changes.subscribe.sort();
        changes.subscribe.dedup();
        let subscribe = &changes.subscribe;
        changes.unsubscribe.retain(|endpoint| !subscribe.contains(endpoint));
        changes.unsubscribe.sort();
        changes.unsubscribe.dedup();
        changes
    }

    fn attach(
        &mut self,
        name: &str,
        endpoint: EndpointRef,
        slot: Slot,
        changes: &mut SourceChanges,
    ) {
        let index = self.index_for_name(name);
        let remote = &mut self.remotes[index];

        match slot {
            Slot::Source => {
                let previous = remote.source.replace(endpoint);
                if previous == Some(endpoint) || !remote.enable_reception {
                    return;
                }
                changes.subscribe.push(endpoint);
                if let Some(previous) = previous {
                    debug!("{} moved from source {} to {}", remote.name, previous, endpoint);
                    changes.unsubscribe.push(previous);
                }
            }
            Slot::Destination => remote.destination = Some(endpoint),
        }
    }

    /// External devices fill whichever endpoint slots the explicit lists left empty
    fn attach_device(&mut self, device: &HostDevice) -> Option<EndpointRef> {
        let index = self.index_for_name(&device.name);
        let remote = &mut self.remotes[index];

        let mut subscribe = None;
        if remote.source.is_none() {
            remote.source = Some(device.endpoint);
            if remote.enable_reception {
                subscribe = Some(device.endpoint);
            }
        }
        if remote.destination.is_none() {
            remote.destination = Some(device.endpoint);
        }
        if device.manufacturer.is_some() {
            remote.manufacturer = device.manufacturer.clone();
        }
        if device.model.is_some() {
            remote.model = device.model.clone();
        }
        subscribe
    }

    /// Index of the remote named `name`, creating a host-only remote if none
    ///
    /// Several remotes sharing one name are flagged and the first one wins.
    fn index_for_name(&mut self, name: &str) -> usize {
        let matches: Vec<usize> = self
            .remotes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.name == name)
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => {
                let remote = RemoteDetails::new(RemoteId::new(), name);
                debug!("New host remote {} ({})", remote.name, remote.id);
                self.remotes.push(remote);
                self.remotes.len() - 1
            }
            [index] => *index,
            [first, ..] => {
                self.sink.record(Diagnostic::AmbiguousName {
                    name: name.to_string(),
                    count: matches.len(),
                    id: self.remotes[*first].id,
                });
                *first
            }
        }
    }

    /// Name of the remote owning `endpoint` as its source
    pub fn source_name(&self, endpoint: EndpointRef) -> String {
        self.find_by_source(endpoint)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| self.catalog.unknown_source_name(endpoint))
    }

    /// Name of the remote with `id`
    pub fn destination_name(&self, id: RemoteId) -> String {
        self.find(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| self.catalog.unknown_destination_name(id))
    }

    /// Description used for inbound traffic from `endpoint`
    pub fn describe_source(&self, endpoint: Option<EndpointRef>) -> String {
        endpoint
            .and_then(|e| self.find_by_source(e))
            .map(RemoteDetails::description)
            .unwrap_or_else(|| self.catalog.unknown_device.clone())
    }

    /// Set the connection state of a known remote
    pub fn set_state(&mut self, id: RemoteId, state: RemoteState) -> bool {
        match self.find_mut(id) {
            Some(remote) => {
                remote.state = state;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::host::{HostMidi, StaticHost};
    use std::sync::Arc;

    fn registry() -> (Registry, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Registry::new(MessageCatalog::default(), sink.clone()), sink)
    }

    fn sighting(id: RemoteId, name: &str, session: u64) -> WirelessSighting {
        WirelessSighting {
            id,
            name: Some(name.to_string()),
            advertised_name: Some(format!("{} BLE", name)),
            session: SessionHandle(session),
        }
    }

    fn endpoint(name: &str, endpoint: u32) -> HostEndpoint {
        HostEndpoint {
            name: name.to_string(),
            endpoint: EndpointRef(endpoint),
        }
    }

    #[test]
    fn test_wireless_sighting_creates_offline() {
        let (mut registry, _) = registry();
        let id = RemoteId::new();
        registry.on_wireless_sighting(sighting(id, "Remote 1", 1));

        let remote = registry.find(id).unwrap();
        assert_eq!(remote.state, RemoteState::Offline);
        assert_eq!(remote.session, Some(SessionHandle(1)));
        assert_eq!(remote.description(), "Remote 1 - Remote 1 BLE");
    }

    #[test]
    fn test_repeat_sighting_resets_to_offline() {
        let (mut registry, _) = registry();
        let id = RemoteId::new();
        registry.on_wireless_sighting(sighting(id, "Remote 1", 1));
        registry.set_state(id, RemoteState::Connected);

        registry.on_wireless_sighting(sighting(id, "Renamed", 2));

        assert_eq!(registry.len(), 1);
        let remote = registry.find(id).unwrap();
        assert_eq!(remote.state, RemoteState::Offline);
        assert_eq!(remote.name, "Renamed");
        assert_eq!(remote.session, Some(SessionHandle(2)));
    }

    #[test]
    fn test_unnamed_sighting_uses_fallback() {
        let (mut registry, _) = registry();
        let id = registry.on_wireless_sighting(WirelessSighting {
            id: RemoteId::new(),
            name: None,
            advertised_name: None,
            session: SessionHandle(3),
        });
        assert_eq!(registry.find(id).unwrap().name, "Unknown device");
    }

    #[test]
    fn test_host_merge_keeps_connected_state() {
        let (mut registry, sink) = registry();
        let id = RemoteId::new();
        registry.on_wireless_sighting(sighting(id, "Remote 1", 1));
        registry.set_state(id, RemoteState::Connected);

        let snapshot = HostSnapshot {
            sources: vec![endpoint("Remote 1", 125)],
            destinations: vec![endpoint("Remote 1", 126)],
            external_devices: Vec::new(),
        };
        registry.reconcile_host(&snapshot);

        assert_eq!(registry.len(), 1);
        let remote = registry.find(id).unwrap();
        assert_eq!(remote.state, RemoteState::Connected);
        assert_eq!(remote.source, Some(EndpointRef(125)));
        assert_eq!(remote.destination, Some(EndpointRef(126)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_host_reconcile_is_idempotent() {
        let (mut registry, _) = registry();
        let snapshot = StaticHost::samples().snapshot().unwrap();

        registry.reconcile_host(&snapshot);
        let first = registry.remotes().to_vec();
        registry.reconcile_host(&snapshot);

        assert_eq!(registry.remotes(), &first[..]);
        assert_eq!(registry.len(), 3);

        let remote3 = registry.remotes().iter().find(|r| r.name == "Remote 3").unwrap();
        assert_eq!(remote3.manufacturer.as_deref(), Some("Tester"));
        assert_eq!(remote3.source, Some(EndpointRef(794)));
        assert_eq!(remote3.destination, Some(EndpointRef(331)));
    }

    #[test]
    fn test_host_reconcile_never_changes_state() {
        let (mut registry, _) = registry();
        let snapshot = StaticHost::samples().snapshot().unwrap();
        registry.reconcile_host(&snapshot);

        let ids: Vec<RemoteId> = registry.remotes().iter().map(|r| r.id).collect();
        registry.set_state(ids[0], RemoteState::Connected);
        registry.set_state(ids[1], RemoteState::Disconnected);

        registry.reconcile_host(&snapshot);

        assert_eq!(registry.find(ids[0]).unwrap().state, RemoteState::Connected);
        assert_eq!(registry.find(ids[1]).unwrap().state, RemoteState::Disconnected);
        assert_eq!(registry.find(ids[2]).unwrap().state, RemoteState::Offline);
    }

    #[test]
    fn test_reconcile_subscribes_new_sources_once() {
        let (mut registry, _) = registry();
        let id = RemoteId::new();
        registry.on_wireless_sighting(sighting(id, "Remote 1", 1));
        registry.find_mut(id).unwrap().enable_reception = true;

        let snapshot = HostSnapshot {
            sources: vec![endpoint("Remote 1", 125)],
            ..Default::default()
        };

        assert_eq!(registry.reconcile_host(&snapshot).subscribe, vec![EndpointRef(125)]);
        assert!(registry.reconcile_host(&snapshot).is_empty());
    }

    #[test]
    fn test_reconcile_replaced_source_is_released() {
        let (mut registry, _) = registry();
        let id = RemoteId::new();
        registry.on_wireless_sighting(sighting(id, "Remote 1", 1));
        registry.find_mut(id).unwrap().enable_reception = true;
        registry.reconcile_host(&HostSnapshot {
            sources: vec![endpoint("Remote 1", 125)],
            ..Default::default()
        });

        let changes = registry.reconcile_host(&HostSnapshot {
            sources: vec![endpoint("Remote 1", 130)],
            ..Default::default()
        });

        assert_eq!(
            changes,
            SourceChanges {
                subscribe: vec![EndpointRef(130)],
                unsubscribe: vec![EndpointRef(125)],
            }
        );
        assert_eq!(registry.find(id).unwrap().source, Some(EndpointRef(130)));
    }

    #[test]
    fn test_name_collision_is_flagged() {
        let (mut registry, sink) = registry();
        let first = RemoteId::new();
        registry.on_wireless_sighting(sighting(first, "Twin", 1));
        registry.on_wireless_sighting(sighting(RemoteId::new(), "Twin", 2));

        let snapshot = HostSnapshot {
            destinations: vec![endpoint("Twin", 9)],
            ..Default::default()
        };
        registry.reconcile_host(&snapshot);

        assert_eq!(registry.find(first).unwrap().destination, Some(EndpointRef(9)));
        assert_eq!(
            sink.take(),
            vec![Diagnostic::AmbiguousName {
                name: "Twin".to_string(),
                count: 2,
                id: first,
            }]
        );
    }

    #[test]
    fn test_name_lookups() {
        let (mut registry, _) = registry();
        registry.reconcile_host(&StaticHost::samples().snapshot().unwrap());
        let remote2 = registry.remotes()[1].id;

        assert_eq!(registry.source_name(EndpointRef(317)), "Remote 2");
        assert_eq!(
            registry.source_name(EndpointRef(1)),
            "Unknown source name for peripheral: 1"
        );
        assert_eq!(registry.destination_name(remote2), "Remote 2");

        let missing = RemoteId::new();
        assert_eq!(
            registry.destination_name(missing),
            format!("Unknown destination name for peripheral: {}", missing)
        );
        assert_eq!(registry.describe_source(None), "Unknown device");
    }
}
