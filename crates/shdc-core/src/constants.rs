//! Protocol-wide timing and sizing constants (§3, §4, §6 of the protocol
//! design). Kept as named constants rather than scattered literals so the
//! engine, replay guard, and codec agree on one source of truth.

use std::time::Duration;

/// Maximum accepted clock skew between a packet's header timestamp and the
/// receiver's local clock, per invariant 1.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Minimum time a `(DeviceId, Nonce3)` entry is retained in the replay
/// guard before it may be swept.
pub const REPLAY_RETENTION: Duration = Duration::from_secs(60);

/// Default broadcast-key rotation period.
pub const BROADCAST_ROTATION_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Default per-sensor session-key rotation period.
pub const SESSION_ROTATION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Grace window during which a just-rotated key's predecessor is still
/// accepted, measured from the new key's `valid_from` timestamp.
pub const ROTATION_GRACE_WINDOW: Duration = Duration::from_secs(60);

/// Default lead time between a `KEY_ROTATION` announcement and the new
/// key's `valid_from`, giving every peer a window to receive it before it
/// takes effect.
pub const ROTATION_ACTIVATION_DELAY: Duration = Duration::from_secs(5);

/// Sensor discovery retry backoff schedule: 5, 10, 20, 30, 30, ... seconds,
/// capped at 30s, until the 5 minute ceiling below is reached.
pub const DISCOVERY_BACKOFF_SECS: &[u64] = &[5, 10, 20, 30];

/// Cap applied to every backoff step after the schedule above is exhausted.
pub const DISCOVERY_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Total time a sensor spends in `DISCOVERING` before giving up and
/// returning to `IDLE`.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Maximum wire size of any SHDC datagram.
pub const MAX_PACKET_SIZE: usize = 512;

/// `12` header bytes `+ 0` payload `+ 64` signature bytes: the smallest
/// possible legal packet.
pub const MIN_PACKET_SIZE: usize = 76;

/// Fixed header length.
pub const HEADER_LEN: usize = 12;

/// Trailing Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Default UDP port for hub<->sensor traffic.
pub const DEFAULT_PORT: u16 = 56700;

/// Default IPv4 multicast discovery group.
pub const DISCOVERY_MULTICAST_ADDR: &str = "239.255.0.1";

/// Fallback IPv4 broadcast address for discovery when multicast isn't
/// available.
pub const DISCOVERY_BROADCAST_ADDR: &str = "255.255.255.255";

/// Number of consecutive signature/AEAD failures from one peer that forces
/// a sensor back to `DISCOVERING`. Not pinned by a literal value in the
/// protocol design's state diagram; see DESIGN.md for the rationale.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
