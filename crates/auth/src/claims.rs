use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use worklane_core::{RoleId, TenantId, UserId};

use crate::{PermissionKind, RoleKind};

/// Bearer credential claims (transport-agnostic).
///
/// This is the set of claims the platform expects once a bearer token has been
/// decoded and its signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject / principal identifier.
    pub sub: UserId,

    /// Tenant the principal belonged to when the token was minted.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,

    #[serde(default)]
    pub role_id: Option<RoleId>,

    #[serde(default)]
    pub role: Option<RoleKind>,

    /// Permissions granted to the principal's role at mint time.
    #[serde(default)]
    pub permissions: Vec<PermissionKind>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unverifiable token")]
    Malformed,
}

/// Deterministically validate the claim time window.
pub fn validate_claims(
    claims: &CredentialClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Parse an `Authorization` header value (`Bearer <token>`).
    pub fn from_authorization(header: &str) -> Option<Self> {
        let token = header.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }
}

impl core::fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BearerCredential(<redacted>)")
    }
}

/// Decodes and verifies bearer credentials.
pub trait CredentialDecoder: Send + Sync {
    fn decode(&self, token: &str, now: DateTime<Utc>)
    -> Result<CredentialClaims, TokenValidationError>;
}

/// HS256 (shared secret) credential decoder.
pub struct Hs256CredentialDecoder {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl Hs256CredentialDecoder {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
        }
    }

    /// Mint a token for the given claims (dev tooling and tests).
    pub fn issue(&self, claims: &CredentialClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|_| TokenValidationError::Malformed)
    }
}

impl CredentialDecoder for Hs256CredentialDecoder {
    fn decode(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<CredentialClaims, TokenValidationError> {
        // The time window lives in our own claim fields, not `exp`/`iat`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<CredentialClaims>(token, &self.decoding, &validation)
            .map_err(|_| TokenValidationError::Malformed)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>) -> CredentialClaims {
        CredentialClaims {
            sub: UserId::new(),
            tenant_id: Some(TenantId::new()),
            role_id: None,
            role: Some(RoleKind::Viewer),
            permissions: vec![PermissionKind::OrgUsersView],
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn issued_tokens_decode_with_same_secret() {
        let decoder = Hs256CredentialDecoder::new(b"secret");
        let now = Utc::now();
        let c = claims(now);
        let token = decoder.issue(&c).unwrap();
        assert_eq!(decoder.decode(&token, now).unwrap(), c);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256CredentialDecoder::new(b"a").issue(&claims(now)).unwrap();
        let err = Hs256CredentialDecoder::new(b"b").decode(&token, now).unwrap_err();
        assert_eq!(err, TokenValidationError::Malformed);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let decoder = Hs256CredentialDecoder::new(b"secret");
        let now = Utc::now();
        let token = decoder.issue(&claims(now)).unwrap();
        let later = now + Duration::hours(1);
        assert_eq!(decoder.decode(&token, later), Err(TokenValidationError::Expired));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let mut c = claims(now);
        c.expires_at = now - Duration::seconds(1);
        assert_eq!(
            validate_claims(&c, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn bearer_parsing_and_redaction() {
        assert!(BearerCredential::from_authorization("Basic abc").is_none());
        assert!(BearerCredential::from_authorization("Bearer   ").is_none());
        let cred = BearerCredential::from_authorization("Bearer abc.def").unwrap();
        assert_eq!(cred.expose(), "abc.def");
        assert!(!format!("{cred:?}").contains("abc"));
    }
}
