//! Password hashing for locally stored accounts
//!
//! Hashes are Argon2id PHC strings; the salt and parameters travel inside the
//! stored string so verification needs nothing else.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::{Alphanumeric, DistString};

// Guard against hashing arbitrarily large inputs
pub const MAX_PASSWORD_LENGTH: usize = 512;

const TEMPORARY_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("the password provided was too long")]
    TooLong,

    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(password_hash::Error),

    #[error("failed to verify password: {0}")]
    Verify(password_hash::Error),
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }

    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::Hash)
}

/// `Ok(false)` means a well-formed hash that did not match
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    let parsed = PasswordHash::new(stored).map_err(PasswordError::MalformedHash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Verify(e)),
    }
}

/// Random credential for self-registered accounts, replaced when an admin approves them
pub fn temporary_password() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), TEMPORARY_PASSWORD_LENGTH)
}
