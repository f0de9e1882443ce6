//! X25519 Diffie-Hellman, built directly on `curve25519-dalek` (already a
//! transitive dependency of `ed25519-dalek`) rather than pulling in a
//! separate `x25519-dalek` crate.

use crate::csrng::Csrng;
use curve25519_dalek::constants::X25519_BASEPOINT;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::montgomery::MontgomeryPoint;
use sha2::{Digest, Sha512};
use shdc_core::CryptoError;
use zeroize::Zeroize;

/// An ephemeral X25519 secret, used once for a single JOIN_RESPONSE seal
/// and then dropped.
pub struct EphemeralSecret {
    scalar_bytes: [u8; 32],
}

impl Drop for EphemeralSecret {
    fn drop(&mut self) {
        self.scalar_bytes.zeroize();
    }
}

impl EphemeralSecret {
    /// Generate a fresh ephemeral secret from a CSRNG.
    pub fn generate(csrng: &dyn Csrng) -> Self {
        let mut raw = [0u8; 32];
        csrng.fill(&mut raw);
        Self {
            scalar_bytes: clamp(raw),
        }
    }

    /// The corresponding public Montgomery point.
    pub fn public(&self) -> [u8; 32] {
        MontgomeryPoint::mul_clamped(X25519_BASEPOINT, self.scalar_bytes).to_bytes()
    }

    /// Compute the shared secret with `their_public`.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_point = MontgomeryPoint(*their_public);
        MontgomeryPoint::mul_clamped(their_point, self.scalar_bytes).to_bytes()
    }
}

fn clamp(mut bytes: [u8; 32]) -> [u8; 32] {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

/// Convert a long-term Ed25519 public identity key to its birationally
/// equivalent X25519 (Montgomery) public key, so a sensor's signing
/// identity can also serve as its join-wrap DH public key.
pub fn ed25519_public_to_x25519(ed_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    CompressedEdwardsY(*ed_public)
        .decompress()
        .map(|point| point.to_montgomery().to_bytes())
        .ok_or(CryptoError::KeyUnavailable)
}

/// Convert a long-term Ed25519 signing seed to its equivalent X25519
/// scalar, by the same SHA-512-and-clamp construction Ed25519 signing
/// uses internally.
pub fn ed25519_seed_to_x25519_scalar(seed: &[u8; 32]) -> [u8; 32] {
    let digest = Sha512::digest(seed);
    let mut scalar_bytes = [0u8; 32];
    scalar_bytes.copy_from_slice(&digest[0..32]);
    clamp(scalar_bytes)
}

/// Diffie-Hellman using a long-term Ed25519-derived X25519 scalar against
/// an ephemeral peer public key.
pub fn diffie_hellman_static(static_scalar: &[u8; 32], their_public: &[u8; 32]) -> [u8; 32] {
    MontgomeryPoint::mul_clamped(MontgomeryPoint(*their_public), *static_scalar).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrng::test_support::FixedCsrng;

    #[test]
    fn ephemeral_dh_agrees_both_sides() {
        let csrng_a = FixedCsrng::new((1u8..=255).collect());
        let csrng_b = FixedCsrng::new((200u8..=255).chain(1u8..=200).collect());

        let a = EphemeralSecret::generate(&csrng_a);
        let b = EphemeralSecret::generate(&csrng_b);

        let shared_a = a.diffie_hellman(&b.public());
        let shared_b = b.diffie_hellman(&a.public());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn static_ephemeral_dh_agrees_both_sides() {
        use crate::ed25519::Keypair;

        let csrng = FixedCsrng::new((10u8..=255).collect());
        let sensor_identity = Keypair::generate(&csrng);
        let sensor_x25519_pub =
            ed25519_public_to_x25519(&sensor_identity.public_key()).unwrap();
        let sensor_x25519_scalar = ed25519_seed_to_x25519_scalar(&sensor_identity.seed());

        let hub_ephemeral = EphemeralSecret::generate(&csrng);

        let shared_from_hub = hub_ephemeral.diffie_hellman(&sensor_x25519_pub);
        let shared_from_sensor =
            diffie_hellman_static(&sensor_x25519_scalar, &hub_ephemeral.public());

        assert_eq!(shared_from_hub, shared_from_sensor);
    }
}
