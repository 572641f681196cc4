//! Access tokens (HS256 JWT)
//!
//! A token is only half of a session: its `jti` must also match a live row in
//! `sessions`, which is what makes logout and deactivation immediate.

use fakturace_shared::UserRole;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const ISSUER: &str = "fakturace";

/// Allowed clock skew when checking `exp`, in seconds
const LEEWAY_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// Role resolved when the session was created
    pub role: UserRole,
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Primary key of the backing session row
    pub jti: String,
}

/// Freshly issued token with the data needed to persist its session
#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: UserRole, email: &str) -> Result<IssuedToken, JwtError> {
        let issued_at = OffsetDateTime::now_utc();
        let expires_at = issued_at + self.ttl;
        let jti = Uuid::new_v4().simple().to_string();

        let claims = Claims {
            sub: user_id,
            role,
            email: email.to_owned(),
            iss: ISSUER.to_owned(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            jti: jti.clone(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Signature, algorithm, issuer and expiry. Session liveness is checked
    /// separately by the middleware.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::InvalidIssuer => JwtError::WrongIssuer,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidToken
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => JwtError::Malformed,
                _ => JwtError::Rejected(e.to_string()),
            })
    }

    /// `expires_in` reported to clients
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.whole_seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token expired")]
    Expired,
    #[error("token issued by another service")]
    WrongIssuer,
    #[error("malformed or forged token")]
    Malformed,
    #[error("could not sign token: {0}")]
    Encoding(String),
    #[error("token rejected: {0}")]
    Rejected(String),
}
