//! Identity, session-key, and broadcast-key storage for both protocol
//! roles, with rotation and grace-window resolution.

#![warn(missing_docs)]

pub mod keys;
pub mod memory;
pub mod records;
pub mod traits;

pub use keys::{BroadcastKeySlot, KeyMaterial, SessionKeySlot};
pub use memory::{HubKeystore, SensorKeystore};
pub use records::{HubRecord, SensorRecord};
pub use traits::{HubPeerStore, IdentityStore, SensorPeerStore};
