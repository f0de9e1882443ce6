//! Storage seams the engine programs against, so tests can swap in bare
//! in-memory fakes without touching the real [`crate::memory::MemoryKeystore`].

use crate::records::{HubRecord, SensorRecord};
use shdc_core::{BroadcastKeyId, DeviceId, ProtocolError};
use shdc_crypto::Keypair;

/// Access to this peer's own long-term Ed25519 identity.
pub trait IdentityStore: Send + Sync {
    /// The long-term identity keypair.
    fn identity(&self) -> &Keypair;
}

/// Hub-side storage of joined sensors and the shared broadcast key.
pub trait HubPeerStore: Send + Sync {
    /// Record a newly joined (or rejoining) sensor.
    fn insert_sensor(&self, record: SensorRecord);

    /// Look up a sensor by its allocated device id.
    fn get_sensor(&self, device_id: DeviceId) -> Option<SensorRecord>;

    /// Forget a sensor entirely (administrative reset).
    fn remove_sensor(&self, device_id: DeviceId) -> bool;

    /// Rotate a sensor's session key in place.
    fn rotate_session(
        &self,
        device_id: DeviceId,
        new_key: [u8; 32],
        now: u32,
    ) -> Result<(), ProtocolError>;

    /// The current broadcast key id and key material.
    fn broadcast_key(&self, now: u32) -> (BroadcastKeyId, [u8; 32]);

    /// Resolve a broadcast key by id, honoring the rotation grace window.
    fn resolve_broadcast_key(&self, id: BroadcastKeyId, now: u32) -> Option<[u8; 32]>;

    /// The id a call to [`Self::rotate_broadcast`] would assign next, so a
    /// caller can announce it before actually applying the rotation.
    fn peek_next_broadcast_id(&self) -> BroadcastKeyId;

    /// Rotate the hub-wide broadcast key to `new_id`, an id previously
    /// obtained from [`Self::peek_next_broadcast_id`].
    fn rotate_broadcast(&self, new_id: BroadcastKeyId, new_key: [u8; 32], now: u32);

    /// Record that a sensor was heard from (join or event) at `now`.
    fn touch_sensor(&self, device_id: DeviceId, now: u32);

    /// Record the broadcast key id a sensor is now known to hold.
    fn ack_broadcast_key(&self, device_id: DeviceId, id: BroadcastKeyId);
}

/// Sensor-side storage of the one hub it has joined.
pub trait SensorPeerStore: Send + Sync {
    /// Record the hub this sensor has just joined.
    fn set_hub(&self, record: HubRecord);

    /// The current hub record, if joined.
    fn hub(&self) -> Option<HubRecord>;

    /// Forget the current hub (administrative reset, or re-discovery).
    fn clear_hub(&self);

    /// Rotate the session key shared with the hub.
    fn update_session_key(&self, new_key: [u8; 32], now: u32) -> Result<(), ProtocolError>;

    /// Install a freshly rotated hub broadcast key.
    fn update_broadcast_key(&self, id: BroadcastKeyId, key: [u8; 32], now: u32);
}
