//! Live host MIDI ports through midir

use std::collections::HashMap;
use std::sync::Arc;

use midir::{
    MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::{HostDevice, HostEndpoint, HostError, HostMidi, InboundCallback};
use crate::midi::{format_hex, packed_to_bytes, UniversalMessage};
use crate::remote::EndpointRef;

/// Numbers ports by name so a port keeps its handle across enumerations
#[derive(Default)]
struct EndpointTable {
    refs: HashMap<String, EndpointRef>,
    next: u32,
}

impl EndpointTable {
    fn resolve(&mut self, key: String) -> EndpointRef {
        if let Some(endpoint) = self.refs.get(&key) {
            return *endpoint;
        }
        self.next += 1;
        let endpoint = EndpointRef(self.next);
        self.refs.insert(key, endpoint);
        endpoint
    }
}

fn input_key(name: &str) -> String {
    format!("in:{}", name)
}

fn output_key(name: &str) -> String {
    format!("out:{}", name)
}

/// Host MIDI backed by the platform ports midir exposes
///
/// Ports are reported as sources and destinations; midir has no notion of
/// external devices. Output connections are opened on first send and kept.
pub struct MidirHost {
    client_name: String,
    port_filter: Option<String>,
    table: Mutex<EndpointTable>,
    inputs: HashMap<EndpointRef, MidiInputConnection<()>>,
    outputs: HashMap<EndpointRef, MidiOutputConnection>,
    callback: Arc<Mutex<Option<InboundCallback>>>,
}

impl MidirHost {
    pub fn new(client_name: impl Into<String>, port_filter: Option<String>) -> Self {
        Self {
            client_name: client_name.into(),
            port_filter: port_filter.map(|f| f.to_lowercase()),
            table: Mutex::new(EndpointTable::default()),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    fn accepts(&self, name: &str) -> bool {
        match &self.port_filter {
            Some(filter) => name.to_lowercase().contains(filter),
            None => true,
        }
    }

    fn midi_in(&self) -> Result<MidiInput, HostError> {
        MidiInput::new(&format!("{}-In", self.client_name))
            .map_err(|e| HostError::Backend(e.to_string()))
    }

    fn midi_out(&self) -> Result<MidiOutput, HostError> {
        MidiOutput::new(&format!("{}-Out", self.client_name))
            .map_err(|e| HostError::Backend(e.to_string()))
    }

    fn find_input_port(
        &self,
        midi_in: &MidiInput,
        source: EndpointRef,
    ) -> Option<(MidiInputPort, String)> {
        let mut table = self.table.lock();
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                if table.resolve(input_key(&name)) == source {
                    return Some((port, name));
                }
            }
        }
        None
    }

    fn find_output_port(
        &self,
        midi_out: &MidiOutput,
        destination: EndpointRef,
    ) -> Option<(MidiOutputPort, String)> {
        let mut table = self.table.lock();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if table.resolve(output_key(&name)) == destination {
                    return Some((port, name));
                }
            }
        }
        None
    }

    fn open_output(
        &mut self,
        destination: EndpointRef,
    ) -> Result<&mut MidiOutputConnection, HostError> {
        if !self.outputs.contains_key(&destination) {
            let midi_out = self.midi_out()?;
            let (port, name) = self
                .find_output_port(&midi_out, destination)
                .ok_or(HostError::EndpointNotFound(destination))?;

            info!("Connecting to output port: {}", name);
            let connection = midi_out
                .connect(&port, &self.client_name)
                .map_err(|e| HostError::Backend(e.to_string()))?;
            self.outputs.insert(destination, connection);
        }

        self.outputs
            .get_mut(&destination)
            .ok_or(HostError::EndpointNotFound(destination))
    }
}

impl HostMidi for MidirHost {
    fn sources(&self) -> Result<Vec<HostEndpoint>, HostError> {
        let midi_in = self.midi_in()?;
        let mut table = self.table.lock();

        let mut sources = Vec::new();
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                if self.accepts(&name) {
                    let endpoint = table.resolve(input_key(&name));
                    sources.push(HostEndpoint { name, endpoint });
                }
            }
        }
        debug!("Found {} MIDI input ports", sources.len());
        Ok(sources)
    }

    fn destinations(&self) -> Result<Vec<HostEndpoint>, HostError> {
        let midi_out = self.midi_out()?;
        let mut table = self.table.lock();

        let mut destinations = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if self.accepts(&name) {
                    let endpoint = table.resolve(output_key(&name));
                    destinations.push(HostEndpoint { name, endpoint });
                }
            }
        }
        debug!("Found {} MIDI output ports", destinations.len());
        Ok(destinations)
    }

    fn external_devices(&self) -> Result<Vec<HostDevice>, HostError> {
        Ok(Vec::new())
    }

    fn subscribe(&mut self, source: EndpointRef) -> Result<(), HostError> {
        if self.inputs.contains_key(&source) {
            return Ok(());
        }

        let midi_in = self.midi_in()?;
        let (port, name) = self
            .find_input_port(&midi_in, source)
            .ok_or(HostError::EndpointNotFound(source))?;

        info!("Connecting to input port: {}", name);
        let callback = self.callback.clone();
        let connection = midi_in
            .connect(
                &port,
                &self.client_name,
                move |_timestamp, data, _| {
                    trace!("MIDI in {}: {}", source, format_hex(data));
                    let Some(message) = UniversalMessage::from_midi1_bytes(data) else {
                        return;
                    };
                    if let Some(callback) = callback.lock().clone() {
                        callback(source, vec![message]);
                    }
                },
                (),
            )
            .map_err(|e| HostError::Backend(e.to_string()))?;

        self.inputs.insert(source, connection);
        Ok(())
    }

    fn unsubscribe(&mut self, source: EndpointRef) -> Result<(), HostError> {
        if self.inputs.remove(&source).is_some() {
            debug!("Closed input port {}", source);
        }
        Ok(())
    }

    fn send(&mut self, destination: EndpointRef, events: &[u32]) -> Result<(), HostError> {
        let result = {
            let connection = self.open_output(destination)?;
            events
                .iter()
                .try_for_each(|&event| connection.send(&packed_to_bytes(event)))
        };

        result.map_err(|e| {
            // Drop the connection so the next send reopens the port
            self.outputs.remove(&destination);
            HostError::Backend(e.to_string())
        })
    }

    fn set_inbound_callback(&mut self, callback: InboundCallback) {
        *self.callback.lock() = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_table_is_stable() {
        let mut table = EndpointTable::default();
        let a = table.resolve(input_key("Keys"));
        let b = table.resolve(output_key("Keys"));

        assert_ne!(a, b);
        assert_eq!(table.resolve(input_key("Keys")), a);
    }

    #[test]
    fn test_port_filter_is_case_insensitive() {
        let host = MidirHost::new("Test", Some("KeyS".to_string()));
        assert!(host.accepts("USB keys 1"));
        assert!(!host.accepts("Drum pad"));
        assert!(MidirHost::new("Test", None).accepts("anything"));
    }
}
