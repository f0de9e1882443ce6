//! Unified error taxonomy for the SHDC protocol engine.
//!
//! Mirrors the error classes of the protocol design one-to-one: each class
//! (decode, crypto, freshness, protocol, transport, fatal) gets its own
//! `thiserror` enum, and [`ShdcError`] aggregates them so callers that don't
//! care which layer failed can match on a single type.

use thiserror::Error;

/// Packet decode failures. Decoding is total: it always returns one of
/// these instead of panicking or producing partial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Fewer than `HEADER_LEN + SIGNATURE_LEN` bytes.
    #[error("packet shorter than the minimum frame size")]
    ShortPacket,
    /// More than `MAX_PACKET_SIZE` bytes.
    #[error("packet exceeds the maximum datagram size")]
    OversizePacket,
    /// The header's `Type` byte does not match a known message type.
    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),
    /// The payload's internal length fields don't agree with the actual
    /// remaining bytes, or a fixed-size field straddles the packet boundary.
    #[error("payload malformed or truncated")]
    MalformedPayload,
}

/// Cryptographic operation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    BadSignature,
    /// AEAD open (or, vanishingly rarely, seal) failed.
    #[error("AEAD operation failed")]
    AeadFailure,
    /// No applicable key (session/broadcast/wrap) was available to try.
    #[error("no key available to resolve this message")]
    KeyUnavailable,
}

/// Replay / freshness rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// `|header.timestamp - now| > 30s`.
    #[error("timestamp outside the freshness window")]
    StaleTimestamp,
    /// `(device_id, nonce)` already seen within the replay window.
    #[error("nonce already seen for this device")]
    ReplayedNonce,
}

/// Protocol-level (state machine) failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message doesn't make sense in the peer's current state.
    #[error("message not valid in the current protocol state")]
    WrongState,
    /// Referenced a `DeviceId` the hub has no record of.
    #[error("unknown device {0:#010x}")]
    UnknownDevice(u32),
    /// The hub declined to admit a joining sensor.
    #[error("join refused: {0}")]
    JoinRefused(String),
}

/// External transport collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// `send` failed at the transport layer.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// `recv` failed at the transport layer.
    #[error("recv failed: {0}")]
    RecvFailed(String),
    /// An operation with a deadline did not complete in time.
    #[error("operation timed out")]
    Timeout,
}

/// Unrecoverable startup failures that abort the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The OS CSRNG could not be read.
    #[error("CSRNG initialization failed: {0}")]
    CryptoInitFailure(String),
    /// No identity keypair was available at `start()`.
    #[error("identity keypair missing")]
    IdentityMissing,
}

/// Aggregate error type for the whole engine. Per-packet failures
/// (everything except [`FatalError`]) are meant to be logged and dropped,
/// never propagated to a caller as a hard failure.
#[derive(Debug, Clone, Error)]
pub enum ShdcError {
    /// Wraps [`CodecError`].
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Wraps [`CryptoError`].
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Wraps [`ReplayError`].
    #[error(transparent)]
    Replay(#[from] ReplayError),
    /// Wraps [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Wraps [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Wraps [`FatalError`].
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl ShdcError {
    /// True for per-packet errors that should be recovered locally
    /// (dropped, logged, counted) rather than aborting anything.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ShdcError::Fatal(_))
    }
}

/// Standard result type for SHDC operations.
pub type Result<T> = std::result::Result<T, ShdcError>;
