//! Identifiers shared across every SHDC component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-bit device identifier. `DeviceId::UNASSIGNED` (`0x0000_0000`) is the
/// sentinel a sensor uses as its own sender id before the hub has allocated
/// it a real one, in `HUB_DISCOVERY_REQ` and `JOIN_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Sentinel value for an unassigned sensor.
    pub const UNASSIGNED: DeviceId = DeviceId(0);

    /// True if this is the unassigned sentinel.
    pub fn is_unassigned(self) -> bool {
        self == Self::UNASSIGNED
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<DeviceId> for u32 {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}

/// Broadcast key version tag, monotonically increasing mod 256. Wrap policy:
/// the next id is never equal to the currently active one (so a 256-rotation
/// run skips the colliding value rather than reusing an id instantaneously).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastKeyId(pub u8);

impl BroadcastKeyId {
    /// The id that follows this one, guaranteed not to equal `self` or, if
    /// given, the previous id still being phased out.
    pub fn next(self, avoid: Option<BroadcastKeyId>) -> BroadcastKeyId {
        let mut candidate = self.0.wrapping_add(1);
        if candidate == self.0 {
            candidate = candidate.wrapping_add(1);
        }
        if let Some(avoid) = avoid {
            if candidate == avoid.0 {
                candidate = candidate.wrapping_add(1);
                if candidate == self.0 {
                    candidate = candidate.wrapping_add(1);
                }
            }
        }
        BroadcastKeyId(candidate)
    }
}

impl fmt::Display for BroadcastKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A 3-byte per-packet nonce, the replay-defense and AEAD-nonce input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce3(pub [u8; 3]);

impl fmt::Display for Nonce3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_sentinel_is_zero() {
        assert!(DeviceId::UNASSIGNED.is_unassigned());
        assert_eq!(DeviceId::UNASSIGNED.0, 0);
    }

    #[test]
    fn broadcast_key_id_next_skips_self() {
        let current = BroadcastKeyId(0xFF);
        let next = current.next(None);
        assert_ne!(next, current);
        assert_eq!(next.0, 0x00);
    }

    #[test]
    fn broadcast_key_id_next_skips_previous_too() {
        let current = BroadcastKeyId(5);
        let previous = BroadcastKeyId(6);
        let next = current.next(Some(previous));
        assert_ne!(next, current);
        assert_ne!(next, previous);
        assert_eq!(next.0, 7);
    }
}
