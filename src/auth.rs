//! Identity resolution.
//!
//! Authentication mechanics live outside this service; what the hub and
//! API need is a verified user id per request. `IdentityProvider` is the
//! seam where a real verifier (JWT validation, session lookup) plugs in.

use crate::config::AuthMode;
use crate::proto::UserId;
use thiserror::Error;

/// Identity resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("malformed identity: {0}")]
    Malformed(String),

    #[error("identity mismatch")]
    Mismatch,
}

/// Credentials extracted from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Identity asserted by an upstream auth proxy (`x-authenticated-user`).
    pub forwarded_user: Option<&'a str>,
    /// Identity the request declares for itself (e.g. the `/ws/{id}` path).
    pub declared: Option<UserId>,
}

/// Resolves the authenticated user for a request.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, credentials: &Credentials<'_>) -> Result<UserId, AuthError>;
}

/// Trusts the identity asserted by an upstream auth proxy.
///
/// Requires the forwarded identity to match any identity the request
/// declares for itself.
pub struct ProxyHeaderIdentity;

impl IdentityProvider for ProxyHeaderIdentity {
    fn authenticate(&self, credentials: &Credentials<'_>) -> Result<UserId, AuthError> {
        let raw = credentials
            .forwarded_user
            .ok_or(AuthError::MissingCredentials)?;
        let user_id: UserId = raw
            .parse()
            .map_err(|_| AuthError::Malformed(raw.to_string()))?;
        if user_id <= 0 {
            return Err(AuthError::Malformed(raw.to_string()));
        }
        if let Some(declared) = credentials.declared
            && declared != user_id
        {
            return Err(AuthError::Mismatch);
        }
        Ok(user_id)
    }
}

/// Accepts the identity the request declares. Development and tests only.
pub struct TrustedIdentity;

impl IdentityProvider for TrustedIdentity {
    fn authenticate(&self, credentials: &Credentials<'_>) -> Result<UserId, AuthError> {
        if let Some(declared) = credentials.declared {
            if declared <= 0 {
                return Err(AuthError::Malformed(declared.to_string()));
            }
            return Ok(declared);
        }
        // No declared identity (REST requests): fall back to the header.
        ProxyHeaderIdentity.authenticate(credentials)
    }
}

/// Build the provider selected by configuration.
pub fn provider_for(mode: AuthMode) -> std::sync::Arc<dyn IdentityProvider> {
    match mode {
        AuthMode::Proxy => std::sync::Arc::new(ProxyHeaderIdentity),
        AuthMode::Trusted => std::sync::Arc::new(TrustedIdentity),
    }
}
