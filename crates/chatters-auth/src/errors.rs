//! Errors raised while minting credentials.
//!
//! Verification failures use [`chatters_core::AuthError`]; these cover the
//! issuing side, which only fails on programmer or environment errors.

/// Failure to produce a token or a password hash.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Signing the token failed.
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    /// bcrypt rejected the input or cost.
    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_error_display() {
        let err: CredentialError = bcrypt::BcryptError::CostNotAllowed(1).into();
        assert!(err.to_string().starts_with("password hashing failed"));
    }
}
