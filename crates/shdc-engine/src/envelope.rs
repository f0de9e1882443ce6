//! The plaintext structures carried inside each message type's sealed
//! AEAD payload, and the seal/open helpers that bind them to a packet's
//! header. `shdc-codec` only ever sees opaque sealed bytes; this module is
//! where the engine gives those bytes meaning.

use shdc_codec::header::Header;
use shdc_core::{BroadcastKeyId, CryptoError};
use shdc_crypto::aead;

fn header_aad(header: &Header) -> [u8; shdc_core::constants::HEADER_LEN] {
    header.encode()
}

fn nonce_for(header: &Header) -> [u8; 12] {
    aead::envelope_nonce(header.timestamp, header.device_id.0, header.nonce.0)
}

/// Seal arbitrary application bytes (an event report or a broadcast
/// command) under `key`, bound to `header`.
pub fn seal_opaque(key: &[u8; 32], header: &Header, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    aead::seal(key, &nonce_for(header), &header_aad(header), plaintext)
}

/// Open a sealed opaque payload under `key`, bound to `header`.
pub fn open_opaque(key: &[u8; 32], header: &Header, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    aead::open(key, &nonce_for(header), &header_aad(header), sealed)
}

/// The grant delivered inside a sealed JOIN_RESPONSE: the freshly
/// allocated session key plus the hub's current broadcast key, so a
/// sensor can decrypt broadcast traffic immediately after joining.
pub struct JoinGrant {
    pub session_key: [u8; 32],
    pub broadcast_key_id: BroadcastKeyId,
    pub broadcast_key: [u8; 32],
}

impl JoinGrant {
    /// Encode as the 65-byte plaintext that gets sealed into JOIN_RESPONSE.
    pub fn encode(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0..32].copy_from_slice(&self.session_key);
        out[32] = self.broadcast_key_id.0;
        out[33..65].copy_from_slice(&self.broadcast_key);
        out
    }

    /// Decode from the opened JOIN_RESPONSE plaintext.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 {
            return Err(CryptoError::KeyUnavailable);
        }
        let mut session_key = [0u8; 32];
        session_key.copy_from_slice(&bytes[0..32]);
        let broadcast_key_id = BroadcastKeyId(bytes[32]);
        let mut broadcast_key = [0u8; 32];
        broadcast_key.copy_from_slice(&bytes[33..65]);
        Ok(Self {
            session_key,
            broadcast_key_id,
            broadcast_key,
        })
    }
}

/// The content of a KEY_ROTATION message, sealed under the recipient's
/// current session key. `valid_from` is the Unix timestamp at which the
/// new key becomes the current one; until then it must be held pending so
/// the previous key's grace window is measured from the right instant.
pub enum KeyRotationGrant {
    /// A fresh per-sensor session key.
    Session { new_key: [u8; 32], valid_from: u32 },
    /// A fresh hub-wide broadcast key and its id.
    Broadcast {
        new_id: BroadcastKeyId,
        new_key: [u8; 32],
        valid_from: u32,
    },
}

impl KeyRotationGrant {
    /// Encode as the sealed plaintext for KEY_ROTATION.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            KeyRotationGrant::Session {
                new_key,
                valid_from,
            } => {
                let mut out = Vec::with_capacity(37);
                out.push(0u8);
                out.extend_from_slice(new_key);
                out.extend_from_slice(&valid_from.to_be_bytes());
                out
            }
            KeyRotationGrant::Broadcast {
                new_id,
                new_key,
                valid_from,
            } => {
                let mut out = Vec::with_capacity(38);
                out.push(1u8);
                out.push(new_id.0);
                out.extend_from_slice(new_key);
                out.extend_from_slice(&valid_from.to_be_bytes());
                out
            }
        }
    }

    /// Decode from the opened KEY_ROTATION plaintext.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.first() {
            Some(0) if bytes.len() == 37 => {
                let mut new_key = [0u8; 32];
                new_key.copy_from_slice(&bytes[1..33]);
                let valid_from = u32::from_be_bytes(bytes[33..37].try_into().unwrap());
                Ok(KeyRotationGrant::Session {
                    new_key,
                    valid_from,
                })
            }
            Some(1) if bytes.len() == 38 => {
                let new_id = BroadcastKeyId(bytes[1]);
                let mut new_key = [0u8; 32];
                new_key.copy_from_slice(&bytes[2..34]);
                let valid_from = u32::from_be_bytes(bytes[34..38].try_into().unwrap());
                Ok(KeyRotationGrant::Broadcast {
                    new_id,
                    new_key,
                    valid_from,
                })
            }
            _ => Err(CryptoError::KeyUnavailable),
        }
    }
}

/// The plaintext carried inside an `EVENT_REPORT`'s session-sealed
/// ciphertext: an application-defined event type tag plus its payload.
pub struct EventReport {
    pub event_type: u8,
    pub data: Vec<u8>,
}

impl EventReport {
    /// Encode as `event_type ∥ data_len u16 ∥ data`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.data.len());
        out.push(self.event_type);
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Decode from the opened EVENT_REPORT plaintext.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < 3 {
            return Err(CryptoError::KeyUnavailable);
        }
        let event_type = bytes[0];
        let data_len = u16::from_be_bytes(bytes[1..3].try_into().unwrap()) as usize;
        if bytes.len() != 3 + data_len {
            return Err(CryptoError::KeyUnavailable);
        }
        Ok(Self {
            event_type,
            data: bytes[3..].to_vec(),
        })
    }
}

/// The plaintext carried inside a `BROADCAST_COMMAND`'s broadcast-sealed
/// ciphertext: an application-defined command type tag plus its payload.
pub struct BroadcastCommand {
    pub cmd_type: u8,
    pub cmd_data: Vec<u8>,
}

impl BroadcastCommand {
    /// Encode as `cmd_type ∥ cmd_len u16 ∥ cmd_data`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.cmd_data.len());
        out.push(self.cmd_type);
        out.extend_from_slice(&(self.cmd_data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.cmd_data);
        out
    }

    /// Decode from the opened BROADCAST_COMMAND plaintext.
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < 3 {
            return Err(CryptoError::KeyUnavailable);
        }
        let cmd_type = bytes[0];
        let cmd_len = u16::from_be_bytes(bytes[1..3].try_into().unwrap()) as usize;
        if bytes.len() != 3 + cmd_len {
            return Err(CryptoError::KeyUnavailable);
        }
        Ok(Self {
            cmd_type,
            cmd_data: bytes[3..].to_vec(),
        })
    }
}
