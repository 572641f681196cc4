//! Admin user management

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use fakturace_billing::UserSubscription;
use fakturace_shared::{page_offset, BillingCycle, PaginatedResponse, UserRole};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{sessions, AuthUser},
    error::{ApiError, ApiResponse, ApiResult},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListUsersQuery {
    /// Case-insensitive match on email or name
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListUsersQuery {
    fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(50).clamp(1, 200)
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct AdminUserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub is_active: bool,
    pub plan_name: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_id: i16,
    #[serde(default)]
    pub billing_cycle: Option<BillingCycle>,
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub user_id: Uuid,
    pub revoked_sessions: u64,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<AdminUserSummary>>>> {
    let page = query.page();
    let per_page = query.per_page();
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM users WHERE ($1::TEXT IS NULL OR email ILIKE $1 OR name ILIKE $1)",
    )
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    // Plan of the most recent subscription row
    let users = sqlx::query_as::<_, AdminUserSummary>(
        r#"
        SELECT u.id, u.email, u.name, u.role, u.email_verified, u.is_active,
               p.name AS plan_name, u.created_at
        FROM users u
        LEFT JOIN LATERAL (
            SELECT plan_id FROM user_subscriptions
            WHERE user_id = u.id
            ORDER BY created_at DESC
            LIMIT 1
        ) s ON TRUE
        LEFT JOIN subscription_plans p ON p.id = s.plan_id
        WHERE ($1::TEXT IS NULL OR u.email ILIKE $1 OR u.name ILIKE $1)
        ORDER BY u.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&search)
    .bind(per_page)
    .bind(page_offset(page, per_page))
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::ok(PaginatedResponse::new(
        users, total, page, per_page,
    )))
}

/// Block the account and end all of its sessions
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<DeactivateResponse>>> {
    if admin.user_id == user_id {
        return Err(ApiError::BadRequest(
            "Nelze deaktivovat vlastní účet".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    let revoked_sessions = sessions::revoke_all_for_user(&state.pool, user_id).await?;

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %user_id,
        revoked_sessions,
        "Admin deactivated user"
    );

    Ok(ApiResponse::ok(DeactivateResponse {
        user_id,
        revoked_sessions,
    }))
}

/// Move a user to another plan immediately. Downgrades below the current
/// month's usage are refused.
pub async fn change_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ChangePlanRequest>,
) -> ApiResult<Json<ApiResponse<UserSubscription>>> {
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::NotFound);
    }

    let subscription = state
        .billing
        .subscriptions
        .admin_change_plan(user_id, req.plan_id, req.billing_cycle)
        .await?;

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %user_id,
        plan_id = req.plan_id,
        "Admin changed user plan"
    );

    Ok(ApiResponse::ok(subscription))
}
