//! Cryptographic primitives for SHDC: Ed25519 signatures, AES-256-GCM
//! AEAD, HKDF-SHA256, and the X25519 join-wrap used to seal JOIN_RESPONSE.
//!
//! This crate has no dependency on `shdc-codec`; callers pass raw header
//! fields rather than a parsed `Header`, so the two leaf crates stay
//! independent of each other.

#![warn(missing_docs)]

pub mod aead;
pub mod csrng;
pub mod ed25519;
pub mod hkdf;
pub mod join_wrap;
pub mod x25519;

pub use aead::{envelope_nonce, open, seal};
pub use csrng::{rand_32, rand_bytes, rand_nonce3, Csrng, OsCsrng};
pub use ed25519::{verify, verify_or_err, Keypair};
pub use join_wrap::SealedJoin;
