//! What this session is allowed to capture.
//!
//! Without a handshake everything is permitted (single-player and servers
//! that do not speak the control protocol). Once a handshake arrives its
//! values hold for the rest of the session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::channel::{CONTROL_CHANNEL, PluginMessage};
use crate::error::CaptureError;

/// Permission payload sent by the server on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionHandshake {
    pub can_download: bool,
    pub can_save_entities: bool,
    pub can_save_tile_entities: bool,
    pub can_save_containers: bool,
    pub can_use_functions_unknown_to_server: bool,
    /// Maximum chunk distance from the player at which chunks are captured.
    #[serde(default)]
    pub save_radius: Option<u32>,
    /// Per entity kind, the maximum distance in blocks at which it is captured.
    #[serde(default)]
    pub entity_ranges: BTreeMap<String, u32>,
}

impl PermissionHandshake {
    pub fn decode(bytes: &[u8]) -> Result<Self, CaptureError> {
        ciborium::from_reader(bytes).map_err(|e| CaptureError::HandshakeDecode(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, CaptureError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CaptureError::HandshakeEncode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a handshake from a control-channel message.
    pub fn from_plugin_message(message: &PluginMessage) -> Result<Self, CaptureError> {
        if message.channel() != CONTROL_CHANNEL {
            return Err(CaptureError::ChannelName(message.channel().to_owned()));
        }
        Self::decode(message.payload())
    }

    pub fn to_plugin_message(&self) -> Result<PluginMessage, CaptureError> {
        PluginMessage::new(CONTROL_CHANNEL, &self.encode()?)
    }
}

/// Immutable permission set for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    negotiated: bool,
    can_download: bool,
    can_save_entities: bool,
    can_save_tile_entities: bool,
    can_save_containers: bool,
    can_use_functions_unknown_to_server: bool,
    save_radius: Option<u32>,
    entity_ranges: BTreeMap<String, u32>,
}

impl Capabilities {
    /// Everything permitted, no limits.
    pub const FAIL_OPEN: Capabilities = Capabilities {
        negotiated: false,
        can_download: true,
        can_save_entities: true,
        can_save_tile_entities: true,
        can_save_containers: true,
        can_use_functions_unknown_to_server: true,
        save_radius: None,
        entity_ranges: BTreeMap::new(),
    };

    pub fn from_handshake(handshake: PermissionHandshake) -> Self {
        Self {
            negotiated: true,
            can_download: handshake.can_download,
            can_save_entities: handshake.can_save_entities,
            can_save_tile_entities: handshake.can_save_tile_entities,
            can_save_containers: handshake.can_save_containers,
            can_use_functions_unknown_to_server: handshake.can_use_functions_unknown_to_server,
            save_radius: handshake.save_radius,
            entity_ranges: handshake.entity_ranges,
        }
    }

    /// Whether a handshake took place.
    pub fn has_permissions(&self) -> bool {
        self.negotiated
    }

    pub fn can_download_in_general(&self) -> bool {
        self.can_download
    }

    pub fn can_save_entities(&self) -> bool {
        self.can_download && self.can_save_entities
    }

    pub fn can_save_tile_entities(&self) -> bool {
        self.can_download && self.can_save_tile_entities
    }

    /// Containers are tile entities, so both flags must allow them.
    pub fn can_save_containers(&self) -> bool {
        self.can_save_tile_entities() && self.can_save_containers
    }

    pub fn can_use_functions_unknown_to_server(&self) -> bool {
        self.can_download && self.can_use_functions_unknown_to_server
    }

    pub fn save_radius(&self) -> Option<u32> {
        self.save_radius
    }

    /// Capture range for an entity kind; `None` means unlimited.
    pub fn entity_range(&self, kind: &str) -> Option<u32> {
        self.entity_ranges.get(kind).copied()
    }

    /// Human-readable permission summary. Empty when nothing was negotiated.
    pub fn describe(&self) -> Vec<String> {
        if !self.negotiated {
            return Vec::new();
        }
        let mut lines = vec![
            format!("Can download: {}", self.can_download_in_general()),
            format!("Can save entities: {}", self.can_save_entities()),
            format!("Can save tile entities: {}", self.can_save_tile_entities()),
            format!("Can save containers: {}", self.can_save_containers()),
            format!(
                "Can use functions unknown to the server: {}",
                self.can_use_functions_unknown_to_server()
            ),
        ];
        if let Some(radius) = self.save_radius {
            lines.push(format!("Save radius: {radius} chunks"));
        }
        for (kind, range) in &self.entity_ranges {
            lines.push(format!("Entity range for {kind}: {range}"));
        }
        lines
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::FAIL_OPEN
    }
}

static FAIL_OPEN: Capabilities = Capabilities::FAIL_OPEN;

/// Per-session holder: starts fail-open, accepts exactly one handshake.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    negotiated: OnceLock<Capabilities>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the negotiated capabilities. A second handshake is rejected
    /// and the first one stays in force.
    pub fn negotiate(&self, handshake: PermissionHandshake) -> Result<&Capabilities, CaptureError> {
        let caps = Capabilities::from_handshake(handshake);
        self.negotiated
            .set(caps)
            .map_err(|_| CaptureError::AlreadyNegotiated)?;
        let current = self.current();
        tracing::info!(
            can_download = current.can_download_in_general(),
            entities = current.can_save_entities(),
            tile_entities = current.can_save_tile_entities(),
            containers = current.can_save_containers(),
            "capabilities negotiated"
        );
        Ok(current)
    }

    /// Current capabilities: the negotiated set, or fail-open defaults.
    pub fn current(&self) -> &Capabilities {
        self.negotiated.get().unwrap_or(&FAIL_OPEN)
    }

    pub fn has_permissions(&self) -> bool {
        self.current().has_permissions()
    }

    pub fn can_download_in_general(&self) -> bool {
        self.current().can_download_in_general()
    }

    pub fn can_save_entities(&self) -> bool {
        self.current().can_save_entities()
    }

    pub fn can_save_tile_entities(&self) -> bool {
        self.current().can_save_tile_entities()
    }

    pub fn can_save_containers(&self) -> bool {
        self.current().can_save_containers()
    }

    pub fn can_use_functions_unknown_to_server(&self) -> bool {
        self.current().can_use_functions_unknown_to_server()
    }
}
