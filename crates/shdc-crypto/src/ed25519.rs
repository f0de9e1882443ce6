//! Ed25519 identity keypairs, signing, and verification (RFC 8032).

use crate::csrng::Csrng;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use shdc_core::CryptoError;
use zeroize::Zeroize;

/// A long-term Ed25519 identity keypair.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from a CSRNG.
    pub fn generate(csrng: &dyn Csrng) -> Self {
        let mut seed = [0u8; 32];
        csrng.fill(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing_key }
    }

    /// Reconstruct a keypair from a persisted 32-byte seed.
    ///
    /// Persistence itself is the external keystore's responsibility; this
    /// only rehydrates the in-memory key material from bytes it hands back.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The 32-byte seed, for handing to the external keystore to persist.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The 32-byte public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `msg`, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.signing_key.sign(msg).to_bytes()
    }
}

/// Verify a 64-byte Ed25519 signature over `msg` against a raw 32-byte
/// public key. Returns `false` (never panics) for a malformed key or
/// signature, matching the "drop on BadSignature" semantics upstream.
pub fn verify(public_key: &[u8; 32], msg: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key.verify(msg, &signature).is_ok()
}

/// Verify and surface the typed error, for call sites that want to
/// propagate [`CryptoError::BadSignature`] rather than branch on a bool.
pub fn verify_or_err(
    public_key: &[u8; 32],
    msg: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    if verify(public_key, msg, signature) {
        Ok(())
    } else {
        Err(CryptoError::BadSignature)
    }
}
