//! Bearer-token verification.
//!
//! Tokens are issued by the external auth service and verified here
//! against the shared secret (HS256). The claims carry the user id in
//! `sub` and a `type` discriminator; only access tokens open sessions.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT claims shared with the auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Token discriminator; sessions require "access".
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
}

/// Token verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("not an access token")]
    NotAccessToken,

    #[error("invalid user id in token")]
    BadSubject,
}

/// Verifies bearer tokens against the shared auth secret.
pub struct AuthVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a token and extract the user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.token_type.as_deref() != Some("access") {
            return Err(AuthError::NotAccessToken);
        }

        Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::BadSubject)
    }
}

/// Issue an access token signed with `secret`. The production issuer is
/// the external auth service; this mirrors its claims for local tooling
/// and tests.
pub fn issue_token(secret: &str, user_id: Uuid, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: time::OffsetDateTime::now_utc().unix_timestamp() + ttl_secs,
        token_type: Some("access".to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 signing cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn verifies_valid_access_token() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, 60);
        let verifier = AuthVerifier::new(SECRET);
        assert_eq!(verifier.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_token("other-secret", Uuid::new_v4(), 60);
        let verifier = AuthVerifier::new(SECRET);
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token(SECRET, Uuid::new_v4(), -60);
        let verifier = AuthVerifier::new(SECRET);
        assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_non_access_token() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: time::OffsetDateTime::now_utc().unix_timestamp() + 60,
            token_type: Some("refresh".to_string()),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let verifier = AuthVerifier::new(SECRET);
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::NotAccessToken)
        ));
    }

    #[test]
    fn rejects_garbage_subject() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            exp: time::OffsetDateTime::now_utc().unix_timestamp() + 60,
            token_type: Some("access".to_string()),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let verifier = AuthVerifier::new(SECRET);
        assert!(matches!(verifier.verify(&token), Err(AuthError::BadSubject)));
    }
}
