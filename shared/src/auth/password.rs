//! # Password Hashing
//!
//! Argon2id with OWASP-recommended work parameters (19 MiB memory cost is
//! the OWASP floor for interactive login; we use a higher 64 MiB cost since
//! this service is not latency-critical and a single verify is allowed to
//! take tens of milliseconds). Hashes are self-describing PHC strings, so
//! parameters can be raised later without invalidating stored hashes early.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::ApiError;

const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
            .expect("static argon2 params are valid");
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl PasswordHasher {
    pub fn hash(&self, plaintext: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Constant-time in the length of `stored` (argon2's verifier compares
    /// full digests, not short-circuiting on the first mismatched byte).
    pub fn verify(&self, plaintext: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hasher = PasswordHasher::default();
        let hash = hasher.hash("correct horse battery staple").unwrap();
        assert!(hasher.verify("correct horse battery staple", &hash));
        assert!(!hasher.verify("wrong password", &hash));
    }

    #[test]
    fn hash_is_self_describing_phc_string() {
        let hasher = PasswordHasher::default();
        let hash = hasher.hash("hunter22222").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn verify_rejects_garbage_stored_hash() {
        let hasher = PasswordHasher::default();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn two_hashes_of_same_password_differ() {
        let hasher = PasswordHasher::default();
        let a = hasher.hash("same-input-1234").unwrap();
        let b = hasher.hash("same-input-1234").unwrap();
        assert_ne!(a, b, "salts must differ between calls");
    }
}
