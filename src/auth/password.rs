use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

use crate::config::HashCost;

const DUMMY_PASSWORD: &str = "dummy-password-for-timing";

/// Argon2id hasher with a fixed work factor.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> anyhow::Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut hasher = Self {
            argon2,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    /// Salted one-way digest in PHC string format.
    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Constant-time check of `plain` against `digest`. A digest that cannot
    /// be parsed never matches.
    pub fn verify(&self, plain: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        self.argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn the same work as a real verification. Always false.
    pub fn verify_dummy(&self, plain: &str) -> bool {
        let _ = self.verify(plain, &self.dummy_hash);
        false
    }
}
