//! Shared types, error taxonomy, and protocol constants for the SHDC
//! (Smart Home Device Communications) engine.
//!
//! This crate has no internal dependencies; every other `shdc-*` crate
//! depends on it.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{
    CodecError, CryptoError, FatalError, ProtocolError, ReplayError, Result, ShdcError,
    TransportError,
};
pub use types::{BroadcastKeyId, DeviceId, Nonce3};
