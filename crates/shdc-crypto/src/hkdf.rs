//! HKDF-SHA256 key derivation, used to turn an X25519 shared secret into
//! the AES-256-GCM key for the JOIN_RESPONSE sealed box.

use hkdf::Hkdf;
use sha2::Sha256;
use shdc_core::CryptoError;

/// Derive `okm_len` bytes of output key material from `ikm`, `salt`, and
/// `info`. Fails only if `okm_len` exceeds HKDF-SHA256's 255*32-byte limit,
/// which never happens for the 32-byte keys this crate derives.
pub fn derive(salt: &[u8], ikm: &[u8], info: &[u8], okm_len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; okm_len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyUnavailable)?;
    Ok(okm)
}

/// Derive a single 32-byte AES-256-GCM key.
pub fn derive_key32(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let okm = derive(salt, ikm, info, 32)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&okm);
    Ok(key)
}
