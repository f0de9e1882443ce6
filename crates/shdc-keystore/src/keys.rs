//! Rotating key material: a current key plus, for the duration of a grace
//! window, the key it replaced.

use shdc_core::constants::ROTATION_GRACE_WINDOW;
use shdc_core::BroadcastKeyId;
use zeroize::Zeroize;

/// A single 32-byte key and the timestamp (epoch seconds) it became valid.
#[derive(Clone, Zeroize)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    pub valid_from: u32,
    pub key: [u8; 32],
}

impl KeyMaterial {
    pub fn new(key: [u8; 32], valid_from: u32) -> Self {
        Self { valid_from, key }
    }
}

/// A per-sensor session key slot: the current key, and the previous one
/// while still inside its grace window after a rotation.
#[derive(Clone)]
pub struct SessionKeySlot {
    current: KeyMaterial,
    previous: Option<KeyMaterial>,
}

impl SessionKeySlot {
    /// Start a fresh slot with no prior key.
    pub fn new(key: [u8; 32], valid_from: u32) -> Self {
        Self {
            current: KeyMaterial::new(key, valid_from),
            previous: None,
        }
    }

    /// Rotate in a new key, retaining the old one for the grace window.
    pub fn rotate(&mut self, key: [u8; 32], now: u32) {
        let outgoing = std::mem::replace(&mut self.current, KeyMaterial::new(key, now));
        self.previous = Some(outgoing);
    }

    /// The current key.
    pub fn current(&self) -> &KeyMaterial {
        &self.current
    }

    /// Every key that should still be accepted at `now`: the current key,
    /// and the previous key if `now` is still within its grace window.
    pub fn acceptable_keys(&self, now: u32) -> Vec<&KeyMaterial> {
        let mut keys = vec![&self.current];
        if let Some(previous) = &self.previous {
            if within_grace(self.current.valid_from, now) {
                keys.push(previous);
            }
        }
        keys
    }
}

/// The hub-wide broadcast key slot: current key plus id, and the previous
/// one while still inside its grace window.
#[derive(Clone)]
pub struct BroadcastKeySlot {
    current_id: BroadcastKeyId,
    current: KeyMaterial,
    previous: Option<(BroadcastKeyId, KeyMaterial)>,
}

impl BroadcastKeySlot {
    /// Start a fresh slot with no prior key.
    pub fn new(id: BroadcastKeyId, key: [u8; 32], valid_from: u32) -> Self {
        Self {
            current_id: id,
            current: KeyMaterial::new(key, valid_from),
            previous: None,
        }
    }

    /// The id [`Self::rotate`] would assign next, so a caller can embed it
    /// in an outgoing announcement before the rotation is actually applied.
    pub fn peek_next_id(&self) -> BroadcastKeyId {
        self.current_id
            .next(self.previous.as_ref().map(|(id, _)| *id))
    }

    /// Rotate to `new_id`/`key`, retaining the old pair for the grace
    /// window. Callers must supply an id obtained from [`Self::peek_next_id`]
    /// at decision time, so the same id reaches both the wire announcement
    /// and the later application of the rotation.
    pub fn rotate(&mut self, new_id: BroadcastKeyId, key: [u8; 32], now: u32) {
        let outgoing_id = self.current_id;
        let outgoing_key = std::mem::replace(&mut self.current, KeyMaterial::new(key, now));
        self.current_id = new_id;
        self.previous = Some((outgoing_id, outgoing_key));
    }

    /// The currently active id.
    pub fn current_id(&self) -> BroadcastKeyId {
        self.current_id
    }

    /// The current key.
    pub fn current(&self) -> &KeyMaterial {
        &self.current
    }

    /// Resolve the key for `id`, honoring the grace window for a just
    /// phased-out previous id.
    pub fn resolve(&self, id: BroadcastKeyId, now: u32) -> Option<&KeyMaterial> {
        if id == self.current_id {
            return Some(&self.current);
        }
        if let Some((previous_id, previous_key)) = &self.previous {
            if *previous_id == id && within_grace(self.current.valid_from, now) {
                return Some(previous_key);
            }
        }
        None
    }
}

fn within_grace(rotated_at: u32, now: u32) -> bool {
    now.saturating_sub(rotated_at) <= ROTATION_GRACE_WINDOW.as_secs() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_slot_accepts_previous_within_grace() {
        let mut slot = SessionKeySlot::new([1u8; 32], 1_000);
        slot.rotate([2u8; 32], 1_000);

        let acceptable = slot.acceptable_keys(1_030);
        assert_eq!(acceptable.len(), 2);
    }

    #[test]
    fn session_slot_drops_previous_after_grace() {
        let mut slot = SessionKeySlot::new([1u8; 32], 1_000);
        slot.rotate([2u8; 32], 1_000);

        let acceptable = slot.acceptable_keys(1_061);
        assert_eq!(acceptable.len(), 1);
        assert_eq!(acceptable[0].key, [2u8; 32]);
    }

    #[test]
    fn broadcast_slot_resolves_previous_id_within_grace() {
        let mut slot = BroadcastKeySlot::new(BroadcastKeyId(1), [1u8; 32], 1_000);
        let new_id = slot.peek_next_id();
        slot.rotate(new_id, [2u8; 32], 1_000);

        assert!(slot.resolve(BroadcastKeyId(1), 1_030).is_some());
        assert!(slot.resolve(new_id, 1_030).is_some());
    }

    #[test]
    fn broadcast_slot_rejects_stale_id_after_grace() {
        let mut slot = BroadcastKeySlot::new(BroadcastKeyId(1), [1u8; 32], 1_000);
        let new_id = slot.peek_next_id();
        slot.rotate(new_id, [2u8; 32], 1_000);

        assert!(slot.resolve(BroadcastKeyId(1), 1_061).is_none());
    }

    #[test]
    fn broadcast_slot_never_reassigns_colliding_id() {
        let mut slot = BroadcastKeySlot::new(BroadcastKeyId(0xFF), [1u8; 32], 0);
        let first_new = slot.peek_next_id();
        slot.rotate(first_new, [2u8; 32], 0);
        assert_eq!(first_new.0, 0x00);

        let second_new = slot.peek_next_id();
        slot.rotate(second_new, [3u8; 32], 0);
        assert_ne!(second_new, first_new);
        assert_ne!(second_new.0, 0xFF);
    }
}
