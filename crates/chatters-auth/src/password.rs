//! bcrypt password hashing.

use crate::errors::CredentialError;

/// Hash `password` with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, CredentialError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Constant-time check of `password` against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}
