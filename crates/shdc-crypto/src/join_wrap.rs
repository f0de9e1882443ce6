//! The JOIN_RESPONSE sealed box: an ephemeral-static X25519 Diffie-Hellman
//! between the hub's one-shot ephemeral key and the sensor's long-term
//! Ed25519 identity (converted to X25519), feeding HKDF-SHA256 into an
//! AES-256-GCM key. This gives the hub's join response confidentiality
//! before any session key exists.

use crate::csrng::Csrng;
use crate::x25519::{diffie_hellman_static, ed25519_public_to_x25519, ed25519_seed_to_x25519_scalar, EphemeralSecret};
use crate::{aead, hkdf};
use shdc_core::CryptoError;

const JOIN_WRAP_INFO: &[u8] = b"shdc-join-v1";
const JOIN_WRAP_NONCE: [u8; 12] = [0u8; 12];

/// Result of sealing a JOIN_RESPONSE: the hub's fresh ephemeral public key
/// (carried in the payload alongside the ciphertext) and the sealed bytes.
pub struct SealedJoin {
    pub eph_pub: [u8; 32],
    pub sealed: Vec<u8>,
}

/// Hub side: seal `plaintext` (the session key and any join parameters)
/// for `sensor_identity_pub`, authenticating `header_bytes` as AAD.
pub fn seal(
    csrng: &dyn Csrng,
    sensor_identity_pub: &[u8; 32],
    header_bytes: &[u8],
    plaintext: &[u8],
) -> Result<SealedJoin, CryptoError> {
    let hub_ephemeral = EphemeralSecret::generate(csrng);
    let sensor_x25519_pub = ed25519_public_to_x25519(sensor_identity_pub)?;
    let shared_secret = hub_ephemeral.diffie_hellman(&sensor_x25519_pub);

    let key = hkdf::derive_key32(header_bytes, &shared_secret, JOIN_WRAP_INFO)?;
    let sealed = aead::seal(&key, &JOIN_WRAP_NONCE, header_bytes, plaintext)?;

    Ok(SealedJoin {
        eph_pub: hub_ephemeral.public(),
        sealed,
    })
}

/// Sensor side: open a sealed JOIN_RESPONSE using the sensor's long-term
/// Ed25519 identity seed and the hub's ephemeral public key from the
/// payload.
pub fn open(
    sensor_identity_seed: &[u8; 32],
    hub_eph_pub: &[u8; 32],
    header_bytes: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let sensor_x25519_scalar = ed25519_seed_to_x25519_scalar(sensor_identity_seed);
    let shared_secret = diffie_hellman_static(&sensor_x25519_scalar, hub_eph_pub);

    let key = hkdf::derive_key32(header_bytes, &shared_secret, JOIN_WRAP_INFO)?;
    aead::open(&key, &JOIN_WRAP_NONCE, header_bytes, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrng::test_support::FixedCsrng;
    use crate::ed25519::Keypair;

    #[test]
    fn hub_seals_sensor_opens() {
        let csrng = FixedCsrng::new((3u8..=255).collect());
        let sensor_identity = Keypair::generate(&csrng);
        let header_bytes = b"fake-12-byte-header-and-more";
        let session_key = [0x42u8; 32];

        let sealed_join = seal(
            &csrng,
            &sensor_identity.public_key(),
            header_bytes,
            &session_key,
        )
        .unwrap();

        let opened = open(
            &sensor_identity.seed(),
            &sealed_join.eph_pub,
            header_bytes,
            &sealed_join.sealed,
        )
        .unwrap();

        assert_eq!(opened, session_key);
    }

    #[test]
    fn wrong_sensor_identity_cannot_open() {
        let csrng = FixedCsrng::new((3u8..=255).collect());
        let sensor_identity = Keypair::generate(&csrng);
        let other_csrng = FixedCsrng::new((99u8..=255).collect());
        let impostor_identity = Keypair::generate(&other_csrng);

        let header_bytes = b"fake-12-byte-header-and-more";
        let sealed_join = seal(
            &csrng,
            &sensor_identity.public_key(),
            header_bytes,
            b"secret-session-key-bytes",
        )
        .unwrap();

        let result = open(
            &impostor_identity.seed(),
            &sealed_join.eph_pub,
            header_bytes,
            &sealed_join.sealed,
        );
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_header_cannot_open() {
        let csrng = FixedCsrng::new((3u8..=255).collect());
        let sensor_identity = Keypair::generate(&csrng);
        let header_bytes = b"fake-12-byte-header-and-more";

        let sealed_join = seal(
            &csrng,
            &sensor_identity.public_key(),
            header_bytes,
            b"secret-session-key-bytes",
        )
        .unwrap();

        let result = open(
            &sensor_identity.seed(),
            &sealed_join.eph_pub,
            b"a-different-header-bytes!!!!",
            &sealed_join.sealed,
        );
        assert!(result.is_err());
    }
}
