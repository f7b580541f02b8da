//! Password digests for the Auth service.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const DEFAULT_ITERATIONS: u32 = 10_000;

/// Turns a password and salt into the digest the Auth store keeps.
pub trait CredentialHasher: Send + Sync + 'static {
    fn generate_salt(&self) -> String;

    fn hash(&self, password: &str, salt: &str) -> String;

    fn verify(&self, password: &str, salt: &str, expected: &str) -> bool {
        constant_time_eq(self.hash(password, salt).as_bytes(), expected.as_bytes())
    }
}

/// Iterated, salted SHA-256.
#[derive(Debug, Clone)]
pub struct Sha256Hasher {
    iterations: u32,
}

impl Sha256Hasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl CredentialHasher for Sha256Hasher {
    fn generate_salt(&self) -> String {
        hex::encode(Uuid::new_v4().as_bytes())
    }

    fn hash(&self, password: &str, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        let mut digest = hasher.finalize();

        for _ in 1..self.iterations {
            let mut hasher = Sha256::new();
            hasher.update(salt.as_bytes());
            hasher.update(digest);
            digest = hasher.finalize();
        }

        hex::encode(digest)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
