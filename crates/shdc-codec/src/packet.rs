//! Whole-packet framing: `Header ∥ Payload ∥ Signature(64)`.

use crate::header::Header;
use crate::payload::Payload;
use shdc_core::constants::{HEADER_LEN, MAX_PACKET_SIZE, MIN_PACKET_SIZE, SIGNATURE_LEN};
use shdc_core::CodecError;

/// A fully decoded, signed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Fixed-size header.
    pub header: Header,
    /// Type-tagged payload.
    pub payload: Payload,
    /// Trailing Ed25519 signature over `header ∥ payload`.
    pub signature: [u8; SIGNATURE_LEN],
}

/// Build the bytes an Ed25519 signature covers (`header ∥ payload`), before
/// a signature exists. Used both to produce a signature when sending and
/// to recompute the signed bytes when verifying a decoded packet.
pub fn signing_bytes(header: &Header, payload: &Payload) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&payload.encode());
    out
}

impl Packet {
    /// Assemble a packet from its parts. `signature` must already cover
    /// [`signing_bytes`] for `header`/`payload`.
    pub fn new(header: Header, payload: Payload, signature: [u8; SIGNATURE_LEN]) -> Self {
        Self {
            header,
            payload,
            signature,
        }
    }

    /// The bytes the signature is supposed to cover. Use this to verify
    /// `self.signature` against `self.header.device_id`'s public key.
    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(&self.header, &self.payload)
    }

    /// Encode the full wire frame: `header ∥ payload ∥ signature`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.signing_bytes();
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode a wire frame. Total. Rejects anything shorter than
    /// [`MIN_PACKET_SIZE`], longer than [`MAX_PACKET_SIZE`], with an
    /// unrecognized `Type`, or with a malformed payload — never panics and
    /// never returns partial state.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < MIN_PACKET_SIZE {
            return Err(CodecError::ShortPacket);
        }
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(CodecError::OversizePacket);
        }

        let header = Header::decode(&bytes[..HEADER_LEN])?;
        let payload_end = bytes.len() - SIGNATURE_LEN;
        let payload_bytes = &bytes[HEADER_LEN..payload_end];
        let payload = Payload::decode(header.msg_type, payload_bytes)?;

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[payload_end..]);

        Ok(Packet {
            header,
            payload,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MessageType;
    use shdc_core::{DeviceId, Nonce3};

    fn sample_packet() -> Packet {
        let header = Header {
            msg_type: MessageType::EventReport,
            device_id: DeviceId(0xAABBCCDD),
            timestamp: 1_700_000_000,
            nonce: Nonce3([9, 9, 9]),
        };
        let payload = Payload::EventReport {
            sealed: vec![0x41; 20],
        };
        Packet::new(header, payload, [0x55; SIGNATURE_LEN])
    }

    #[test]
    fn round_trips() {
        let packet = sample_packet();
        let bytes = packet.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_short_packet() {
        assert_matches::assert_matches!(
            Packet::decode(&[0u8; 10]),
            Err(CodecError::ShortPacket)
        );
    }

    #[test]
    fn rejects_oversize_packet() {
        let bytes = vec![0u8; MAX_PACKET_SIZE + 1];
        assert_matches::assert_matches!(
            Packet::decode(&bytes),
            Err(CodecError::OversizePacket)
        );
    }

    #[test]
    fn flipping_a_payload_bit_changes_signing_bytes() {
        let packet = sample_packet();
        let original = packet.signing_bytes();

        let mut tampered = packet.clone();
        if let Payload::EventReport { sealed } = &mut tampered.payload {
            sealed[0] ^= 0x01;
        }
        let tampered_bytes = tampered.signing_bytes();

        assert_ne!(original, tampered_bytes);
    }
}
