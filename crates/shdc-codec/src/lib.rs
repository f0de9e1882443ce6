//! Bit-exact packet encode/decode for the SHDC wire protocol.
//!
//! Layout: `Header(12B) ∥ Payload(variable) ∥ Signature(64B)`, big-endian
//! integers throughout, `≤512B` total. This crate has no internal
//! dependencies other than [`shdc_core`].

pub mod header;
pub mod packet;
pub mod payload;

pub use header::{Header, MessageType};
pub use packet::{signing_bytes, Packet};
pub use payload::Payload;
