use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::AuthConfig;

use super::JwtValidator;

/// Numeric user id carried by authenticated sessions
pub type Uid = i64;

/// Who a session acts as. Immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    User { uid: Uid },
    Anonymous,
}

impl Identity {
    pub fn uid(&self) -> Option<Uid> {
        match self {
            Identity::User { uid } => Some(*uid),
            Identity::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User { uid } => write!(f, "uid:{}", uid),
            Identity::Anonymous => write!(f, "anonymous"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingCredential,

    #[error("invalid access token: {0}")]
    InvalidToken(String),

    #[error("access token expired")]
    Expired,

    #[error("access token signature mismatch")]
    InvalidSignature,

    #[error("invalid token claim: {0}")]
    InvalidClaim(String),

    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),
}

/// Verifies a connection credential and resolves the identity of the peer.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// `credential` is `None` when the client supplied no token at all.
    async fn authorize(&self, credential: Option<&str>) -> Result<Identity, AuthError>;
}

/// [`AuthService`] backed by HMAC-signed JWTs whose `sub` is the numeric uid.
pub struct JwtAuthService {
    validator: JwtValidator,
    allow_anonymous: bool,
}

impl JwtAuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            validator: JwtValidator::new(config),
            allow_anonymous: config.allow_anonymous,
        }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn authorize(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let token = match credential.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ if self.allow_anonymous => return Ok(Identity::Anonymous),
            _ => return Err(AuthError::MissingCredential),
        };

        let claims = self.validator.validate(token)?;
        let uid = claims
            .uid()
            .ok_or_else(|| AuthError::InvalidSubject(claims.sub.clone()))?;

        Ok(Identity::User { uid })
    }
}
