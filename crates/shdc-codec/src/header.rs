//! The fixed 12-byte SHDC header: `Type(1) ∥ DeviceId(4) ∥ Timestamp(4) ∥ Nonce(3)`.

use shdc_core::constants::HEADER_LEN;
use shdc_core::{CodecError, DeviceId, Nonce3};

/// Wire message type tags. Values are the `Type` byte from the protocol
/// design's message table; they are not contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `0x00` — cleartext, signed discovery broadcast from a sensor.
    HubDiscoveryReq,
    /// `0x01` — session-sealed sensor event.
    EventReport,
    /// `0x02` — cleartext, signed join request from a sensor.
    JoinRequest,
    /// `0x03` — join-wrap-sealed hub response carrying the new session/broadcast keys.
    JoinResponse,
    /// `0x04` — broadcast-key-sealed hub command.
    BroadcastCommand,
    /// `0x05` — session/broadcast-key-sealed rotation announcement.
    KeyRotation,
    /// `0x06` — cleartext, signed discovery reply from the hub.
    HubDiscoveryResp,
}

impl MessageType {
    /// The wire byte for this message type.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::HubDiscoveryReq => 0x00,
            MessageType::EventReport => 0x01,
            MessageType::JoinRequest => 0x02,
            MessageType::JoinResponse => 0x03,
            MessageType::BroadcastCommand => 0x04,
            MessageType::KeyRotation => 0x05,
            MessageType::HubDiscoveryResp => 0x06,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::HubDiscoveryReq),
            0x01 => Ok(MessageType::EventReport),
            0x02 => Ok(MessageType::JoinRequest),
            0x03 => Ok(MessageType::JoinResponse),
            0x04 => Ok(MessageType::BroadcastCommand),
            0x05 => Ok(MessageType::KeyRotation),
            0x06 => Ok(MessageType::HubDiscoveryResp),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

/// The fixed-size part of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type.
    pub msg_type: MessageType,
    /// Sender device id (`0` for an unassigned sensor during discovery).
    pub device_id: DeviceId,
    /// UNIX seconds at the time of sending.
    pub timestamp: u32,
    /// 3-byte per-packet random nonce.
    pub nonce: Nonce3,
}

impl Header {
    /// Encode into exactly [`HEADER_LEN`] bytes, big-endian.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.msg_type.as_u8();
        out[1..5].copy_from_slice(&self.device_id.0.to_be_bytes());
        out[5..9].copy_from_slice(&self.timestamp.to_be_bytes());
        out[9..12].copy_from_slice(&self.nonce.0);
        out
    }

    /// Decode from the first [`HEADER_LEN`] bytes of a packet.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::ShortPacket);
        }
        let msg_type = MessageType::try_from(bytes[0])?;
        let device_id = DeviceId(u32::from_be_bytes(bytes[1..5].try_into().unwrap()));
        let timestamp = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
        let nonce = Nonce3([bytes[9], bytes[10], bytes[11]]);
        Ok(Header {
            msg_type,
            device_id,
            timestamp,
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            msg_type: MessageType::EventReport,
            device_id: DeviceId(0xAABBCCDD),
            timestamp: 1_700_000_000,
            nonce: Nonce3([1, 2, 3]),
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn unknown_type_rejected() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 0x42;
        assert_matches::assert_matches!(
            Header::decode(&bytes),
            Err(CodecError::UnknownType(0x42))
        );
    }

    #[test]
    fn short_header_rejected() {
        assert_matches::assert_matches!(Header::decode(&[0u8; 4]), Err(CodecError::ShortPacket));
    }
}
