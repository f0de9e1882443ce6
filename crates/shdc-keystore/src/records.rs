//! Per-peer records held by each role's keystore.

use crate::keys::{BroadcastKeySlot, SessionKeySlot};
use shdc_core::{BroadcastKeyId, DeviceId};

/// Hub-side bookkeeping for one sensor: its identity, allocated device id,
/// session key slot, and the liveness/ack state named in the protocol
/// design's data model.
#[derive(Clone)]
pub struct SensorRecord {
    pub device_id: DeviceId,
    pub identity_pubkey: [u8; 32],
    pub session: SessionKeySlot,
    /// Unix timestamp of the last authenticated packet this sensor sent
    /// (join or event). Mutated by join and receipt of events.
    pub last_seen: u32,
    /// The broadcast key id this sensor is known to have acknowledged,
    /// i.e. the id it was handed at join or the last rotation delivered to
    /// it. Mutated by join and key rotation.
    pub broadcast_key_id_acked: BroadcastKeyId,
}

impl SensorRecord {
    pub fn new(
        device_id: DeviceId,
        identity_pubkey: [u8; 32],
        session: SessionKeySlot,
        now: u32,
        broadcast_key_id: BroadcastKeyId,
    ) -> Self {
        Self {
            device_id,
            identity_pubkey,
            session,
            last_seen: now,
            broadcast_key_id_acked: broadcast_key_id,
        }
    }
}

/// Sensor-side bookkeeping for its hub: the hub's identity, allocated
/// device id, session key, and the hub-wide broadcast key.
#[derive(Clone)]
pub struct HubRecord {
    pub hub_id: u32,
    pub hub_pubkey: [u8; 32],
    pub device_id: DeviceId,
    pub session: SessionKeySlot,
    pub broadcast: BroadcastKeySlot,
}

impl HubRecord {
    pub fn new(
        hub_id: u32,
        hub_pubkey: [u8; 32],
        device_id: DeviceId,
        session: SessionKeySlot,
        broadcast: BroadcastKeySlot,
    ) -> Self {
        Self {
            hub_id,
            hub_pubkey,
            device_id,
            session,
            broadcast,
        }
    }
}
