use crate::live::{BlockEntityKind, EntityKind};

/// Errors raised while configuring or feeding the capture layer.
///
/// Unknown types and forbidden categories are not errors; they simply
/// produce no observation.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("block entity {kind:?} is claimed by both {first} and {second}")]
    DuplicateBlockHandler {
        kind: BlockEntityKind,
        first: &'static str,
        second: &'static str,
    },
    #[error("entity {kind:?} is claimed by both {first} and {second}")]
    DuplicateEntityHandler {
        kind: EntityKind,
        first: &'static str,
        second: &'static str,
    },
    #[error("capabilities were already negotiated for this session")]
    AlreadyNegotiated,
    #[error("handshake decode error: {0}")]
    HandshakeDecode(String),
    #[error("handshake encode error: {0}")]
    HandshakeEncode(String),
    #[error("invalid channel name {0:?}")]
    ChannelName(String),
    #[error("plugin message payload of {size} bytes exceeds {max}")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("invalid value {value:?} for setting {setting}")]
    SettingParse { setting: &'static str, value: String },
}
