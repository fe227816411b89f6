//! Control payloads (JSON, tagged by `op`)

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::packet::{encode, MediaType, PacketFlags};
use crate::error::PacketError;

/// Format announcement for one logical stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatAnnouncement {
    pub stream_id: u16,
    /// Sample rate
    pub sr: u32,
    /// Channel count
    pub ch: u16,
    /// Pre-roll the server applied to the first frame
    pub lead_ms: u32,
    pub frame_ms: u32,
    /// Sender clock at announcement time
    pub server_time_us: u64,
    /// Producer-side stream key
    #[serde(default)]
    pub key: String,
}

/// Control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Client registration. `port` overrides the datagram source port.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    Format(FormatAnnouncement),
}

impl ControlMessage {
    pub fn to_payload(&self) -> Result<Vec<u8>, PacketError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, PacketError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Wrap in a Control packet. Format messages carry their stream id in the header.
    pub fn to_packet(&self, seq: u32, pts_us: u64) -> Result<Bytes, PacketError> {
        let stream_id = match self {
            ControlMessage::Format(format) => format.stream_id,
            ControlMessage::Hello { .. } => 0,
        };
        let payload = self.to_payload()?;
        Ok(encode(
            MediaType::Control,
            stream_id,
            seq,
            pts_us,
            PacketFlags::NONE,
            &payload,
        ))
    }
}

/// Packet a client sends to register with a server
pub fn hello_packet(port: Option<u16>) -> Result<Bytes, PacketError> {
    ControlMessage::Hello { port }.to_packet(0, 0)
}
