//! Session records backing JWT revocation
//!
//! Every issued access token has a row keyed by its `jti`. A token is honoured
//! only while its row exists, is not revoked and has not expired.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

pub async fn save_session(
    pool: &PgPool,
    user_id: Uuid,
    jti: &str,
    expires_at: OffsetDateTime,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sessions (jti, user_id, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(jti)
    .bind(user_id)
    .bind(expires_at)
    .bind(ip_address)
    .bind(user_agent)
    .execute(pool)
    .await?;

    Ok(())
}

/// True when the session exists, is not revoked and belongs to an active user
pub async fn is_session_active(pool: &PgPool, jti: &str) -> Result<bool, sqlx::Error> {
    let active: Option<(bool,)> = sqlx::query_as(
        r#"
        SELECT u.is_active
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.jti = $1 AND s.revoked_at IS NULL AND s.expires_at > NOW()
        "#,
    )
    .bind(jti)
    .fetch_optional(pool)
    .await?;

    Ok(active.map(|(is_active,)| is_active).unwrap_or(false))
}

pub async fn revoke_session(pool: &PgPool, jti: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE jti = $1 AND revoked_at IS NULL")
        .bind(jti)
        .execute(pool)
        .await?;
    Ok(())
}

/// Used on password reset and account deactivation
pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        tracing::info!(user_id = %user_id, count = result.rows_affected(), "Sessions revoked");
    }
    Ok(result.rows_affected())
}
