//! CSRNG abstraction. Production code always uses [`OsCsrng`]; tests inject
//! a deterministic source so discovery/join scenarios are reproducible.

use rand_core::RngCore;

/// Source of cryptographically secure random bytes.
pub trait Csrng: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

/// The OS CSRNG (`getrandom`, via `rand::rngs::OsRng`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCsrng;

impl Csrng for OsCsrng {
    fn fill(&self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// Generate `n` random bytes from `csrng`.
pub fn rand_bytes(csrng: &dyn Csrng, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    csrng.fill(&mut buf);
    buf
}

/// Generate a random 32-byte array from `csrng`.
pub fn rand_32(csrng: &dyn Csrng) -> [u8; 32] {
    let mut buf = [0u8; 32];
    csrng.fill(&mut buf);
    buf
}

/// Generate a random 3-byte packet nonce from `csrng`.
pub fn rand_nonce3(csrng: &dyn Csrng) -> [u8; 3] {
    let mut buf = [0u8; 3];
    csrng.fill(&mut buf);
    buf
}
