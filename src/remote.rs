//! Remote device entity and identifier types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a remote device
///
/// Wireless remotes reuse the identifier reported by the radio stack;
/// host-only remotes get a fresh random one on first sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(Uuid);

impl RemoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RemoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Uppercase, as radio stacks usually print peripheral identifiers
        write!(f, "{}", self.0.hyphenated().to_string().to_uppercase())
    }
}

impl std::str::FromStr for RemoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque handle of a host MIDI source or destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointRef(pub u32);

impl std::fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a radio session with a peripheral
///
/// Owned by the radio stack; the registry only keeps it for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub u64);

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Connection state of a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    /// Seen but never connected, or re-advertising
    #[default]
    Offline,
    Connected,
    Disconnected,
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteState::Offline => write!(f, "offline"),
            RemoteState::Connected => write!(f, "connected"),
            RemoteState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Everything known about one remote device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDetails {
    /// Primary key, never changes once created
    pub id: RemoteId,
    /// Display name, last writer wins
    pub name: String,
    /// Name from the wireless advertisement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertised_name: Option<String>,
    #[serde(skip)]
    pub session: Option<SessionHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EndpointRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<EndpointRef>,
    /// Inbound messages wanted from this remote
    pub enable_reception: bool,
    pub state: RemoteState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RemoteDetails {
    /// Create an offline remote with no handles
    pub fn new(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            advertised_name: None,
            session: None,
            source: None,
            destination: None,
            enable_reception: false,
            state: RemoteState::Offline,
            manufacturer: None,
            model: None,
        }
    }

    /// Name shown for inbound traffic, `"name - advertised"` when both exist
    pub fn description(&self) -> String {
        match self.advertised_name.as_deref() {
            Some(advertised) if !advertised.is_empty() => {
                format!("{} - {}", self.name, advertised)
            }
            _ => self.name.clone(),
        }
    }

    /// Whether outbound packets have somewhere to go
    pub fn has_usable_destination(&self) -> bool {
        self.destination.is_some() || self.session.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.state == RemoteState::Connected
    }
}
