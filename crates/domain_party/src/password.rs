//! Password hashing port and its argon2 implementation

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;

use crate::error::PartyError;

/// Hashes and verifies user passwords
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PartyError>;

    /// `Ok(false)` for a wrong password; `Err` only for a malformed hash
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PartyError>;
}

/// Argon2id with default parameters, PHC string output
#[derive(Debug, Default, Clone)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PartyError> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| PartyError::Password(e.to_string()))?;

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PartyError::Password(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PartyError> {
        let parsed = PasswordHash::new(hash).map_err(|e| PartyError::Password(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;

    /// Reversible stand-in for fast tests
    #[derive(Debug, Default, Clone)]
    pub struct PlainTextPasswordHasher;

    impl PasswordHasher for PlainTextPasswordHasher {
        fn hash(&self, password: &str) -> Result<String, PartyError> {
            Ok(format!("plain${}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, PartyError> {
            hash.strip_prefix("plain$")
                .map(|stored| stored == password)
                .ok_or_else(|| PartyError::Password("not a plain-text hash".to_string()))
        }
    }
}
