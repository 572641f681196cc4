//! Email verification and password reset tokens
//!
//! The raw token only ever leaves the server inside an email link; the
//! database stores its SHA-256 hash. Tokens are single use and expire after
//! one hour.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const TOKEN_VALIDITY: Duration = Duration::hours(1);

/// Token type for verification flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    EmailVerification,
    PasswordReset,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::EmailVerification => "email_verification",
            TokenType::PasswordReset => "password_reset",
        }
    }
}

/// Issues and consumes verification tokens
#[derive(Clone)]
pub struct TokenManager {
    pool: PgPool,
}

impl TokenManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 32 random bytes, hex encoded (64 characters)
    fn generate_token() -> String {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().gen();
        hex::encode(bytes)
    }

    fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Create a token, superseding unused tokens of the same type.
    /// Returns the raw token to embed in the email link.
    pub async fn create_token(
        &self,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<String, sqlx::Error> {
        let raw_token = Self::generate_token();
        let token_hash = Self::hash_token(&raw_token);
        let expires_at = OffsetDateTime::now_utc() + TOKEN_VALIDITY;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE verification_tokens
            SET used_at = NOW()
            WHERE user_id = $1 AND token_type = $2 AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(token_type.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO verification_tokens (user_id, token_hash, token_type, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(token_type.as_str())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            token_type = %token_type.as_str(),
            expires_at = %expires_at,
            "Verification token created"
        );

        Ok(raw_token)
    }

    /// Validate and consume a token. Returns the owning user id.
    pub async fn validate_and_consume_token(
        &self,
        raw_token: &str,
        token_type: TokenType,
    ) -> Result<Uuid, TokenError> {
        let token_hash = Self::hash_token(raw_token.trim());

        // Marking as used in the same statement makes concurrent use impossible
        let consumed: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE verification_tokens
            SET used_at = NOW()
            WHERE token_hash = $1 AND token_type = $2
              AND used_at IS NULL AND expires_at > NOW()
            RETURNING id, user_id
            "#,
        )
        .bind(&token_hash)
        .bind(token_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Token lookup failed");
            TokenError::DatabaseError
        })?;

        if let Some((token_id, user_id)) = consumed {
            tracing::info!(
                token_id = %token_id,
                user_id = %user_id,
                token_type = %token_type.as_str(),
                "Token validated and consumed"
            );
            return Ok(user_id);
        }

        // Distinguish the failure for logs and the response
        let record: Option<TokenRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, expires_at, used_at
            FROM verification_tokens
            WHERE token_hash = $1 AND token_type = $2
            "#,
        )
        .bind(&token_hash)
        .bind(token_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| TokenError::DatabaseError)?;

        let record = record.ok_or(TokenError::InvalidToken)?;
        if record.used_at.is_some() {
            tracing::warn!(token_id = %record.id, user_id = %record.user_id, "Attempted to reuse token");
            return Err(TokenError::AlreadyUsed);
        }

        tracing::warn!(
            token_id = %record.id,
            user_id = %record.user_id,
            expires_at = %record.expires_at,
            "Attempted to use expired token"
        );
        Err(TokenError::Expired)
    }
}

/// Token validation errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or unknown token")]
    InvalidToken,
    #[error("Token has already been used")]
    AlreadyUsed,
    #[error("Token has expired")]
    Expired,
    #[error("Database error")]
    DatabaseError,
}

#[derive(sqlx::FromRow)]
struct TokenRecord {
    id: Uuid,
    user_id: Uuid,
    expires_at: OffsetDateTime,
    used_at: Option<OffsetDateTime>,
}
