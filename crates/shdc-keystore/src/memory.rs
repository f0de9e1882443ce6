//! In-memory, lock-guarded implementations of the storage traits.

use crate::keys::{BroadcastKeySlot, SessionKeySlot};
use crate::records::{HubRecord, SensorRecord};
use crate::traits::{HubPeerStore, IdentityStore, SensorPeerStore};
use parking_lot::RwLock;
use shdc_core::{BroadcastKeyId, DeviceId, ProtocolError};
use shdc_crypto::Keypair;
use std::collections::HashMap;
use tracing::debug;

/// Hub-side keystore: this hub's identity, every joined sensor, and the
/// shared broadcast key.
pub struct HubKeystore {
    identity: Keypair,
    sensors: RwLock<HashMap<DeviceId, SensorRecord>>,
    broadcast: RwLock<BroadcastKeySlot>,
}

impl HubKeystore {
    /// Build a fresh hub keystore, seeding the broadcast key slot.
    pub fn new(identity: Keypair, initial_broadcast_key: [u8; 32], now: u32) -> Self {
        Self {
            identity,
            sensors: RwLock::new(HashMap::new()),
            broadcast: RwLock::new(BroadcastKeySlot::new(
                BroadcastKeyId(0),
                initial_broadcast_key,
                now,
            )),
        }
    }
}

impl IdentityStore for HubKeystore {
    fn identity(&self) -> &Keypair {
        &self.identity
    }
}

impl HubPeerStore for HubKeystore {
    fn insert_sensor(&self, record: SensorRecord) {
        debug!(device_id = %record.device_id, "hub keystore: sensor recorded");
        self.sensors.write().insert(record.device_id, record);
    }

    fn get_sensor(&self, device_id: DeviceId) -> Option<SensorRecord> {
        self.sensors.read().get(&device_id).cloned()
    }

    fn remove_sensor(&self, device_id: DeviceId) -> bool {
        let removed = self.sensors.write().remove(&device_id).is_some();
        if removed {
            debug!(device_id = %device_id, "hub keystore: sensor removed");
        }
        removed
    }

    fn rotate_session(
        &self,
        device_id: DeviceId,
        new_key: [u8; 32],
        now: u32,
    ) -> Result<(), ProtocolError> {
        let mut sensors = self.sensors.write();
        let record = sensors
            .get_mut(&device_id)
            .ok_or(ProtocolError::UnknownDevice(device_id.0))?;
        record.session.rotate(new_key, now);
        Ok(())
    }

    fn broadcast_key(&self, _now: u32) -> (BroadcastKeyId, [u8; 32]) {
        let slot = self.broadcast.read();
        (slot.current_id(), slot.current().key)
    }

    fn resolve_broadcast_key(&self, id: BroadcastKeyId, now: u32) -> Option<[u8; 32]> {
        self.broadcast.read().resolve(id, now).map(|km| km.key)
    }

    fn peek_next_broadcast_id(&self) -> BroadcastKeyId {
        self.broadcast.read().peek_next_id()
    }

    fn rotate_broadcast(&self, new_id: BroadcastKeyId, new_key: [u8; 32], now: u32) {
        self.broadcast.write().rotate(new_id, new_key, now);
        debug!(new_id = %new_id, "hub keystore: broadcast key rotated");
    }

    fn touch_sensor(&self, device_id: DeviceId, now: u32) {
        if let Some(record) = self.sensors.write().get_mut(&device_id) {
            record.last_seen = now;
        }
    }

    fn ack_broadcast_key(&self, device_id: DeviceId, id: BroadcastKeyId) {
        if let Some(record) = self.sensors.write().get_mut(&device_id) {
            record.broadcast_key_id_acked = id;
        }
    }
}

/// Sensor-side keystore: this sensor's identity and, once joined, its
/// hub's record.
pub struct SensorKeystore {
    identity: Keypair,
    hub: RwLock<Option<HubRecord>>,
}

impl SensorKeystore {
    /// Build a fresh sensor keystore with no hub joined yet.
    pub fn new(identity: Keypair) -> Self {
        Self {
            identity,
            hub: RwLock::new(None),
        }
    }
}

impl IdentityStore for SensorKeystore {
    fn identity(&self) -> &Keypair {
        &self.identity
    }
}

impl SensorPeerStore for SensorKeystore {
    fn set_hub(&self, record: HubRecord) {
        debug!(hub_id = record.hub_id, "sensor keystore: hub joined");
        *self.hub.write() = Some(record);
    }

    fn hub(&self) -> Option<HubRecord> {
        self.hub.read().clone()
    }

    fn clear_hub(&self) {
        debug!("sensor keystore: hub record cleared");
        *self.hub.write() = None;
    }

    fn update_session_key(&self, new_key: [u8; 32], now: u32) -> Result<(), ProtocolError> {
        let mut guard = self.hub.write();
        let record = guard.as_mut().ok_or(ProtocolError::WrongState)?;
        record.session.rotate(new_key, now);
        Ok(())
    }

    fn update_broadcast_key(&self, id: BroadcastKeyId, key: [u8; 32], now: u32) {
        let mut guard = self.hub.write();
        if let Some(record) = guard.as_mut() {
            record.broadcast.rotate(id, key, now);
        }
    }
}
