//! Transport over the local host enumeration
//!
//! There is no session to negotiate: connecting and disconnecting flip the
//! remote's state directly, and scanning is an enumeration pass.

use tracing::info;

use super::{ScanOutcome, TransportError};
use crate::registry::Registry;
use crate::remote::{RemoteId, RemoteState};

#[derive(Debug, Default)]
pub struct LocalTransport {
    scanning: bool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn start_scanning(&mut self) -> ScanOutcome {
        self.scanning = true;
        ScanOutcome::Refresh
    }

    pub fn stop_scanning(&mut self) {
        self.scanning = false;
    }

    pub fn connect(&mut self, registry: &mut Registry, id: RemoteId) -> Result<(), TransportError> {
        if !registry.set_state(id, RemoteState::Connected) {
            return Err(TransportError::TargetNotFound(id));
        }
        info!("Connected to {}", registry.destination_name(id));
        Ok(())
    }

    pub fn disconnect(
        &mut self,
        registry: &mut Registry,
        id: RemoteId,
    ) -> Result<(), TransportError> {
        if !registry.set_state(id, RemoteState::Disconnected) {
            return Err(TransportError::TargetNotFound(id));
        }
        info!("Disconnected from {}", registry.destination_name(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MessageCatalog;
    use crate::diagnostics::RecordingSink;
    use crate::host::{HostMidi, StaticHost};
    use std::sync::Arc;

    fn registry() -> Registry {
        let mut registry = Registry::new(MessageCatalog::default(), Arc::new(RecordingSink::new()));
        registry.reconcile_host(&StaticHost::samples().snapshot().unwrap());
        registry
    }

    #[test]
    fn test_connect_and_disconnect_flip_state() {
        let mut registry = registry();
        let mut transport = LocalTransport::new();
        let id = registry.remotes()[0].id;

        transport.connect(&mut registry, id).unwrap();
        assert_eq!(registry.find(id).unwrap().state, RemoteState::Connected);

        transport.disconnect(&mut registry, id).unwrap();
        transport.disconnect(&mut registry, id).unwrap();
        assert_eq!(registry.find(id).unwrap().state, RemoteState::Disconnected);
    }

    #[test]
    fn test_unknown_target() {
        let mut registry = registry();
        let mut transport = LocalTransport::new();
        let id = RemoteId::new();

        assert_eq!(
            transport.connect(&mut registry, id),
            Err(TransportError::TargetNotFound(id))
        );
        assert!(registry
            .remotes()
            .iter()
            .all(|r| r.state == RemoteState::Offline));
    }

    #[test]
    fn test_scanning_is_a_refresh() {
        let mut transport = LocalTransport::new();
        assert_eq!(transport.start_scanning(), ScanOutcome::Refresh);
        assert!(transport.is_scanning());

        transport.stop_scanning();
        transport.stop_scanning();
        assert!(!transport.is_scanning());
    }
}
