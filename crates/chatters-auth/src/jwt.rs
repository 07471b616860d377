//! HS256 bearer tokens.
//!
//! Claims: `user_id`, `iat`, `exp`. The default lifetime is 72 hours.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatters_core::{AuthError, AuthValidator, UserId};

use crate::errors::CredentialError;

/// Token payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to.
    pub user_id: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Issues and verifies tokens with a shared HMAC secret.
pub struct JwtAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthority {
    /// Create an authority for `secret` issuing tokens valid for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `user`.
    pub fn issue(&self, user: &UserId) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(&Claims {
            user_id: user.as_str().to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, CredentialError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}

impl fmt::Debug for JwtAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthority")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AuthValidator for JwtAuthority {
    fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;
        if data.claims.user_id.is_empty() {
            return Err(AuthError::Invalid("empty user_id claim".into()));
        }
        Ok(UserId::from_raw(data.claims.user_id))
    }
}
