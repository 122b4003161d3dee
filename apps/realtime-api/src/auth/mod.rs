//! Session authentication for realtime connections and internal callers.

pub mod middleware;
pub mod tokens;

use std::sync::Arc;

use crate::directory::{DirectoryError, UserDirectory, UserIdentity};

use tokens::TokenVerifier;

/// Why a connection attempt was refused. Always terminal for that attempt.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential signature")]
    InvalidSignature,
    #[error("credential expired")]
    Expired,
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl AuthError {
    /// Short reason sent in the close frame.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Missing credential",
            AuthError::InvalidSignature => "Invalid credential",
            AuthError::Expired => "Credential expired",
            AuthError::UnknownUser => "User not found",
            AuthError::Directory(_) => "Authentication unavailable",
        }
    }
}

/// Resolves a connection's bearer credential to a user identity.
pub struct Authenticator {
    verifier: TokenVerifier,
    directory: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(jwt_secret: &str, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            verifier: TokenVerifier::new(jwt_secret),
            directory,
        }
    }

    pub async fn authenticate(&self, credential: Option<&str>) -> Result<UserIdentity, AuthError> {
        let token = credential.ok_or(AuthError::MissingCredential)?;
        let claims = self.verifier.verify(token)?;

        self.directory
            .find_user(&claims.id)
            .await?
            .ok_or(AuthError::UnknownUser)
    }
}
