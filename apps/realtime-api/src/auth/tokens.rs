//! Bearer credential decoding for realtime connections.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Claims carried by the session token the CRUD service issues at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The user id.
    pub id: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Verifies HS256 session tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Check signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    tracing::debug!(?e, "session token rejected");
                    AuthError::InvalidSignature
                }
            })
    }
}
