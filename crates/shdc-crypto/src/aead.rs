//! AES-256-GCM seal/open and the SHDC envelope nonce construction.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use shdc_core::CryptoError;

/// Build the 12-byte GCM nonce for a standard (non-join-wrap) envelope:
/// `Timestamp(4B) ∥ DeviceId(4B) ∥ Nonce(3B) ∥ 0x00`. Binding the nonce to
/// the exact header means header-level replay defense also protects
/// against nonce reuse under the same key.
pub fn envelope_nonce(timestamp: u32, device_id: u32, nonce: [u8; 3]) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0..4].copy_from_slice(&timestamp.to_be_bytes());
    out[4..8].copy_from_slice(&device_id.to_be_bytes());
    out[8..11].copy_from_slice(&nonce);
    out[11] = 0x00;
    out
}

/// AEAD-seal `plaintext` under `key`, authenticating `aad`. Returns
/// `ciphertext ∥ tag(16B)`.
pub fn seal(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadFailure)
}

/// AEAD-open `ciphertext` (including its trailing 16-byte tag) under `key`,
/// authenticating `aad`. A failure here — wrong key, tampered ciphertext,
/// or mismatched `aad` — is reported uniformly as [`CryptoError::AeadFailure`],
/// never distinguished to an attacker or a caller.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadFailure)
}
