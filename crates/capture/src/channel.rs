//! Outbound custom-payload messages. The payload format belongs to the
//! server-side protocol; this only validates and copies the bytes.

use crate::error::CaptureError;

/// Channel carrying the permission handshake.
pub const CONTROL_CHANNEL: &str = "WDL|CONTROL";
/// Channel used to ask the server for permissions.
pub const INIT_CHANNEL: &str = "WDL|INIT";

pub const MAX_CHANNEL_LEN: usize = 20;
pub const MAX_PAYLOAD_LEN: usize = 32767;

/// A named-channel payload ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    channel: String,
    payload: Vec<u8>,
}

impl PluginMessage {
    /// Build a message, copying `bytes`.
    pub fn new(channel: impl Into<String>, bytes: &[u8]) -> Result<Self, CaptureError> {
        let channel = channel.into();
        if channel.is_empty() || channel.chars().count() > MAX_CHANNEL_LEN {
            return Err(CaptureError::ChannelName(channel));
        }
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(CaptureError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            channel,
            payload: bytes.to_vec(),
        })
    }

    /// The permission request sent when joining a server.
    pub fn permission_request(client_version: &str) -> Result<Self, CaptureError> {
        Self::new(INIT_CHANNEL, client_version.as_bytes())
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.channel, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_copied() {
        let mut bytes = vec![1u8, 2, 3];
        let message = PluginMessage::new("WDL|REQUEST", &bytes).unwrap();
        bytes[0] = 9;
        assert_eq!(message.payload(), &[1, 2, 3]);
        assert_eq!(message.channel(), "WDL|REQUEST");
    }

    #[test]
    fn channel_name_limits() {
        assert!(PluginMessage::new("", &[]).is_err());
        assert!(PluginMessage::new("a".repeat(MAX_CHANNEL_LEN), &[]).is_ok());
        assert!(matches!(
            PluginMessage::new("a".repeat(MAX_CHANNEL_LEN + 1), &[]),
            Err(CaptureError::ChannelName(_))
        ));
    }

    #[test]
    fn payload_size_limit() {
        let big = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            PluginMessage::new("WDL|INIT", &big),
            Err(CaptureError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn permission_request_uses_init_channel() {
        let (channel, payload) = PluginMessage::permission_request("0.1.0").unwrap().into_parts();
        assert_eq!(channel, INIT_CHANNEL);
        assert_eq!(payload, b"0.1.0");
    }
}
