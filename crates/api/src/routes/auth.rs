//! Authentication routes

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use fakturace_billing::{CzechAccount, SubscriptionService};
use fakturace_shared::UserRole;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        hash_password, sessions, validate_password_strength, verify_password, AuthUser,
        VerificationTokenType,
    },
    error::{ApiError, ApiResponse, ApiResult},
    routes::extract_client_ip,
    state::AppState,
};

/// Floor for login and reset-request response times
const MIN_RESPONSE_TIME: Duration = Duration::from_millis(500);

// =============================================================================
// Request / Response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Profile fields a user may change. An empty bank account clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bank_account: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub bank_account: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, FromRow)]
struct LoginRow {
    id: Uuid,
    password_hash: String,
    role: UserRole,
    is_active: bool,
}

const USER_COLUMNS: &str = "id, email, name, role, email_verified, bank_account, created_at";

// =============================================================================
// Helpers
// =============================================================================

fn audit_context(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    (extract_client_ip(headers), user_agent)
}

async fn pad_response_time(start: Instant) {
    let elapsed = start.elapsed();
    if elapsed < MIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_RESPONSE_TIME - elapsed).await;
    }
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty()
        || local.len() > 64
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
        || !local.chars().all(|c| c.is_alphanumeric() || ".+-_".contains(c))
    {
        return false;
    }

    if domain.starts_with(['.', '-'])
        || domain.ends_with(['.', '-'])
        || domain.contains("..")
        || !domain.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((_, tld)) => tld.chars().count() >= 2 && tld.chars().all(|c| c.is_alphabetic()),
        None => false,
    }
}

async fn fetch_user(state: &AppState, user_id: Uuid) -> ApiResult<UserResponse> {
    let user = sqlx::query_as::<_, UserResponse>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(user)
}

/// Issue an access token and persist its session
async fn start_session(
    state: &AppState,
    headers: &HeaderMap,
    user_id: Uuid,
    role: UserRole,
    email: &str,
) -> ApiResult<String> {
    let (ip_address, user_agent) = audit_context(headers);

    let issued = state.jwt_manager.issue(user_id, role, email).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue access token");
        ApiError::Internal
    })?;

    sessions::save_session(
        &state.pool,
        user_id,
        &issued.jti,
        issued.expires_at,
        ip_address.as_deref(),
        user_agent.as_deref(),
    )
    .await?;

    Ok(issued.token)
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a user. The Free subscription is created in the same transaction.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    if !state.config.enable_signup {
        return Err(ApiError::BadRequest("Registrace je momentálně vypnutá".to_string()));
    }

    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation("Neplatná e-mailová adresa".to_string()));
    }

    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::Validation(
            "Jméno musí mít 1 až 100 znaků".to_string(),
        ));
    }

    validate_password_strength(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.pool)
        .await?;
    if exists {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let user_id = Uuid::new_v4();
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, name, role)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(name)
    .bind(UserRole::User)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        let duplicate = e
            .as_database_error()
            .and_then(|d| d.code())
            .is_some_and(|code| code == "23505");
        // Lost a race with a concurrent registration
        if duplicate {
            ApiError::EmailAlreadyExists
        } else {
            ApiError::from(e)
        }
    })?;

    SubscriptionService::create_initial(&mut *tx, user_id).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "User registered");

    let tokens = state.tokens.clone();
    let email_service = state.email.clone();
    let to = email.clone();
    tokio::spawn(async move {
        match tokens
            .create_token(user_id, VerificationTokenType::EmailVerification)
            .await
        {
            Ok(token) => {
                email_service.send_email_verification(&to, &token).await;
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to create verification token");
            }
        }
    });

    let access_token = start_session(&state, &headers, user_id, UserRole::User, &email).await?;
    let user = fetch_user(&state, user_id).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(AuthResponse {
            access_token,
            token_type: "Bearer",
            expires_in: state.jwt_manager.ttl_seconds(),
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let start = Instant::now();
    let result = login_inner(&state, &headers, &req).await;
    pad_response_time(start).await;
    result
}

async fn login_inner(
    state: &AppState,
    headers: &HeaderMap,
    req: &LoginRequest,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let email = req.email.trim().to_lowercase();

    let row: Option<LoginRow> = sqlx::query_as(
        "SELECT id, password_hash, role, is_active FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        tracing::info!("Login failed: unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = verify_password(&req.password, &row.password_hash).map_err(|e| {
        tracing::error!(user_id = %row.id, error = %e, "Stored password hash is unreadable");
        ApiError::Internal
    })?;
    if !valid {
        tracing::info!(user_id = %row.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    if !row.is_active {
        tracing::warn!(user_id = %row.id, "Login attempt on deactivated account");
        return Err(ApiError::AccountDisabled);
    }

    let access_token = start_session(state, headers, row.id, row.role, &email).await?;
    let user = fetch_user(state, row.id).await?;

    tracing::info!(user_id = %row.id, role = %row.role, "User logged in");

    Ok(ApiResponse::ok(AuthResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.jwt_manager.ttl_seconds(),
        user,
    }))
}

/// Revoke the session behind the presented token
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    sessions::revoke_session(&state.pool, &auth_user.jti).await?;

    tracing::info!(user_id = %auth_user.user_id, "User logged out");

    Ok(ApiResponse::ok(MessageResponse {
        message: "Odhlášení proběhlo úspěšně",
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    Ok(ApiResponse::ok(fetch_user(&state, auth_user.user_id).await?))
}

/// Update name and the bank account used on payment QR codes
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if n.is_empty() || n.chars().count() > 100 => {
            return Err(ApiError::Validation("Jméno musí mít 1 až 100 znaků".to_string()));
        }
        other => other,
    };

    // Some("") clears the account, None leaves it untouched
    let bank_account = match req.bank_account.as_deref().map(str::trim) {
        Some("") => Some(None),
        Some(raw) => {
            let account: CzechAccount = raw.parse()?;
            Some(Some(account.to_string()))
        }
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            bank_account = CASE WHEN $3 THEN $4 ELSE bank_account END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(auth_user.user_id)
    .bind(name)
    .bind(bank_account.is_some())
    .bind(bank_account.flatten())
    .execute(&state.pool)
    .await?;

    tracing::info!(user_id = %auth_user.user_id, "Profile updated");

    Ok(ApiResponse::ok(fetch_user(&state, auth_user.user_id).await?))
}

/// Request a password reset link. Always answers the same way.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    let start = Instant::now();

    let user: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, email FROM users WHERE email = $1 AND is_active = TRUE")
            .bind(req.email.trim().to_lowercase())
            .fetch_optional(&state.pool)
            .await?;

    if let Some((user_id, email)) = user {
        let tokens = state.tokens.clone();
        let email_service = state.email.clone();
        tokio::spawn(async move {
            match tokens
                .create_token(user_id, VerificationTokenType::PasswordReset)
                .await
            {
                Ok(token) => {
                    email_service.send_password_reset(&email, &token).await;
                    tracing::info!(user_id = %user_id, "Password reset requested");
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to create password reset token");
                }
            }
        });
    }

    pad_response_time(start).await;

    Ok(ApiResponse::ok(MessageResponse {
        message: "Pokud účet s tímto e-mailem existuje, poslali jsme na něj odkaz pro obnovení hesla",
    }))
}

/// Set a new password with a reset token and end every session of the user
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    validate_password_strength(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let user_id = state
        .tokens
        .validate_and_consume_token(&req.token, VerificationTokenType::PasswordReset)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid password reset token");
            ApiError::InvalidToken
        })?;

    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let email: String = sqlx::query_scalar(
        "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2 RETURNING email",
    )
    .bind(&password_hash)
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    let revoked = sessions::revoke_all_for_user(&state.pool, user_id).await?;

    tracing::info!(user_id = %user_id, revoked_sessions = revoked, "Password reset completed");

    let email_service = state.email.clone();
    tokio::spawn(async move {
        email_service.send_password_changed(&email).await;
    });

    Ok(ApiResponse::ok(MessageResponse {
        message: "Heslo bylo změněno",
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    let user_id = state
        .tokens
        .validate_and_consume_token(&req.token, VerificationTokenType::EmailVerification)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid email verification token");
            ApiError::InvalidToken
        })?;

    sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %user_id, "Email verified");

    Ok(ApiResponse::ok(MessageResponse {
        message: "E-mail byl ověřen",
    }))
}
