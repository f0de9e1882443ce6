//! Per-type payload layouts (wire protocol table in the design's external
//! interfaces section). The codec frames and parses these payloads but
//! never interprets encrypted contents — sealed fields are handed through
//! as opaque bytes for `shdc-crypto` to open.

use crate::header::MessageType;
use shdc_core::CodecError;

/// A decoded, type-tagged payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `HUB_DISCOVERY_REQ`: `pubkey[32] ∥ info_len u8 ∥ info[info_len]`, cleartext.
    HubDiscoveryReq {
        /// Sensor's Ed25519 identity public key.
        pubkey: [u8; 32],
        /// Free-form capability/info bytes.
        info: Vec<u8>,
    },
    /// `HUB_DISCOVERY_RESP`: `hub_id u32 ∥ hub_pubkey[32] ∥ caps_len u8 ∥ caps[caps_len]`, cleartext.
    HubDiscoveryResp {
        /// Hub-allocated id for itself.
        hub_id: u32,
        /// Hub's Ed25519 identity public key.
        hub_pubkey: [u8; 32],
        /// Free-form capability bytes.
        caps: Vec<u8>,
    },
    /// `JOIN_REQUEST`: `pubkey[32] ∥ info_len u8 ∥ info[info_len]`, cleartext.
    JoinRequest {
        /// Sensor's Ed25519 identity public key.
        pubkey: [u8; 32],
        /// Free-form capability/info bytes.
        info: Vec<u8>,
    },
    /// `JOIN_RESPONSE`: `eph_pub[32] ∥ AEAD(...)`. `sealed` is the ciphertext-plus-tag.
    JoinResponse {
        /// Hub's ephemeral X25519 public key for the join-wrap exchange.
        eph_pub: [u8; 32],
        /// AEAD-sealed `assigned_id ∥ session_key ∥ bkid ∥ broadcast_key`.
        sealed: Vec<u8>,
    },
    /// `EVENT_REPORT`: `AEAD_session(event_type ∥ data_len ∥ data)`.
    EventReport {
        /// Ciphertext-plus-tag sealed under the sensor's session key.
        sealed: Vec<u8>,
    },
    /// `BROADCAST_COMMAND`: `bkid u8 ∥ AEAD_broadcast(cmd_type ∥ cmd_len u16 ∥ cmd_data)`.
    BroadcastCommand {
        /// Broadcast key version the ciphertext is sealed under.
        bkid: u8,
        /// Ciphertext-plus-tag.
        sealed: Vec<u8>,
    },
    /// `KEY_ROTATION`: `AEAD_current(scope ∥ new_key[32] ∥ valid_from u32 ∥ new_bkid u8?)`.
    KeyRotation {
        /// Ciphertext-plus-tag sealed under the current session/broadcast key.
        sealed: Vec<u8>,
    },
}

fn read_u8_len_prefixed(bytes: &[u8], offset: usize) -> Result<(&[u8], usize), CodecError> {
    let len = *bytes.get(offset).ok_or(CodecError::MalformedPayload)? as usize;
    let start = offset + 1;
    let end = start + len;
    if end != bytes.len() {
        return Err(CodecError::MalformedPayload);
    }
    Ok((&bytes[start..end], end))
}

impl Payload {
    /// The message type this payload belongs to.
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::HubDiscoveryReq { .. } => MessageType::HubDiscoveryReq,
            Payload::HubDiscoveryResp { .. } => MessageType::HubDiscoveryResp,
            Payload::JoinRequest { .. } => MessageType::JoinRequest,
            Payload::JoinResponse { .. } => MessageType::JoinResponse,
            Payload::EventReport { .. } => MessageType::EventReport,
            Payload::BroadcastCommand { .. } => MessageType::BroadcastCommand,
            Payload::KeyRotation { .. } => MessageType::KeyRotation,
        }
    }

    /// Encode this payload's on-wire bytes (the part between the header and
    /// the trailing signature).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Payload::HubDiscoveryReq { pubkey, info } | Payload::JoinRequest { pubkey, info } => {
                let mut out = Vec::with_capacity(32 + 1 + info.len());
                out.extend_from_slice(pubkey);
                out.push(info.len() as u8);
                out.extend_from_slice(info);
                out
            }
            Payload::HubDiscoveryResp {
                hub_id,
                hub_pubkey,
                caps,
            } => {
                let mut out = Vec::with_capacity(4 + 32 + 1 + caps.len());
                out.extend_from_slice(&hub_id.to_be_bytes());
                out.extend_from_slice(hub_pubkey);
                out.push(caps.len() as u8);
                out.extend_from_slice(caps);
                out
            }
            Payload::JoinResponse { eph_pub, sealed } => {
                let mut out = Vec::with_capacity(32 + sealed.len());
                out.extend_from_slice(eph_pub);
                out.extend_from_slice(sealed);
                out
            }
            Payload::EventReport { sealed } | Payload::KeyRotation { sealed } => sealed.clone(),
            Payload::BroadcastCommand { bkid, sealed } => {
                let mut out = Vec::with_capacity(1 + sealed.len());
                out.push(*bkid);
                out.extend_from_slice(sealed);
                out
            }
        }
    }

    /// Decode a payload given the header's message type and the remaining
    /// bytes between the header and the signature.
    pub fn decode(msg_type: MessageType, bytes: &[u8]) -> Result<Self, CodecError> {
        match msg_type {
            MessageType::HubDiscoveryReq | MessageType::JoinRequest => {
                if bytes.len() < 33 {
                    return Err(CodecError::MalformedPayload);
                }
                let pubkey: [u8; 32] = bytes[0..32].try_into().unwrap();
                let (info, _) = read_u8_len_prefixed(bytes, 32)?;
                let info = info.to_vec();
                Ok(if msg_type == MessageType::HubDiscoveryReq {
                    Payload::HubDiscoveryReq { pubkey, info }
                } else {
                    Payload::JoinRequest { pubkey, info }
                })
            }
            MessageType::HubDiscoveryResp => {
                if bytes.len() < 4 + 32 + 1 {
                    return Err(CodecError::MalformedPayload);
                }
                let hub_id = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
                let hub_pubkey: [u8; 32] = bytes[4..36].try_into().unwrap();
                let (caps, _) = read_u8_len_prefixed(bytes, 36)?;
                Ok(Payload::HubDiscoveryResp {
                    hub_id,
                    hub_pubkey,
                    caps: caps.to_vec(),
                })
            }
            MessageType::JoinResponse => {
                if bytes.len() < 32 {
                    return Err(CodecError::MalformedPayload);
                }
                let eph_pub: [u8; 32] = bytes[0..32].try_into().unwrap();
                let sealed = bytes[32..].to_vec();
                Ok(Payload::JoinResponse { eph_pub, sealed })
            }
            MessageType::EventReport => Ok(Payload::EventReport {
                sealed: bytes.to_vec(),
            }),
            MessageType::KeyRotation => Ok(Payload::KeyRotation {
                sealed: bytes.to_vec(),
            }),
            MessageType::BroadcastCommand => {
                if bytes.is_empty() {
                    return Err(CodecError::MalformedPayload);
                }
                let bkid = bytes[0];
                let sealed = bytes[1..].to_vec();
                Ok(Payload::BroadcastCommand { bkid, sealed })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_req_round_trips() {
        let payload = Payload::HubDiscoveryReq {
            pubkey: [7u8; 32],
            info: b"temp-sensor".to_vec(),
        };
        let bytes = payload.encode();
        let decoded = Payload::decode(MessageType::HubDiscoveryReq, &bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn broadcast_command_round_trips() {
        let payload = Payload::BroadcastCommand {
            bkid: 0x02,
            sealed: vec![0xAA; 20],
        };
        let bytes = payload.encode();
        let decoded = Payload::decode(MessageType::BroadcastCommand, &bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn truncated_info_len_rejected() {
        let mut bytes = vec![0u8; 32];
        bytes.push(10); // claims 10 info bytes but supplies none
        assert!(Payload::decode(MessageType::JoinRequest, &bytes).is_err());
    }
}
