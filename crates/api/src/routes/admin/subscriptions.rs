//! Admin subscription management

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use fakturace_billing::{SubscriptionListItem, SubscriptionPayment, UserSubscription};
use fakturace_shared::SubscriptionStatus;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiResponse, ApiResult},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(default = "default_true")]
    pub create_payment_record: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl Default for ConfirmPaymentRequest {
    fn default() -> Self {
        Self {
            create_payment_record: true,
            note: None,
        }
    }
}

fn default_true() -> bool {
    true
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<SubscriptionListItem>>>> {
    let rows = state.billing.subscriptions.list(query.status).await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<SubscriptionPayment>>>> {
    let payments = state.billing.subscriptions.payments(subscription_id).await?;
    Ok(ApiResponse::ok(payments))
}

/// Activate a pending subscription after the bank transfer arrived
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
    body: Option<Json<ConfirmPaymentRequest>>,
) -> ApiResult<Json<ApiResponse<UserSubscription>>> {
    let Json(req) = body.unwrap_or_default();

    let subscription = state
        .billing
        .subscriptions
        .confirm_payment(subscription_id, req.create_payment_record, req.note)
        .await?;

    tracing::info!(
        admin_id = %admin.user_id,
        subscription_id = %subscription_id,
        user_id = %subscription.user_id,
        "Admin confirmed subscription payment"
    );

    let plan = state.billing.plans.plan(subscription.plan_id).await?;
    let email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
        .bind(subscription.user_id)
        .fetch_one(&state.pool)
        .await?;
    let email_service = state.email.clone();
    tokio::spawn(async move {
        email_service
            .send_subscription_activated(&email, &plan.name)
            .await;
    });

    Ok(ApiResponse::ok(subscription))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserSubscription>>> {
    let subscription = state.billing.subscriptions.cancel(subscription_id).await?;
    tracing::info!(admin_id = %admin.user_id, subscription_id = %subscription_id, "Admin canceled subscription");
    Ok(ApiResponse::ok(subscription))
}

pub async fn reactivate_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserSubscription>>> {
    let subscription = state
        .billing
        .subscriptions
        .reactivate(subscription_id)
        .await?;
    tracing::info!(admin_id = %admin.user_id, subscription_id = %subscription_id, "Admin reactivated subscription");
    Ok(ApiResponse::ok(subscription))
}

/// Push the period end out by one billing cycle
pub async fn extend_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserSubscription>>> {
    let subscription = state.billing.subscriptions.extend(subscription_id).await?;
    tracing::info!(admin_id = %admin.user_id, subscription_id = %subscription_id, "Admin extended subscription");
    Ok(ApiResponse::ok(subscription))
}
