//! Subscription routes for the signed-in user

use axum::{extract::State, http::StatusCode, Extension, Json};
use fakturace_billing::{CzechAccount, SubscriptionOverview, SubscriptionPlan, UpgradeRequest};
use fakturace_shared::BillingCycle;
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResponse, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpgradeBody {
    pub plan_id: i16,
    #[serde(default = "default_cycle")]
    pub billing_cycle: BillingCycle,
}

fn default_cycle() -> BillingCycle {
    BillingCycle::Monthly
}

/// Current subscription, the plan in force and this month's usage
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ApiResponse<SubscriptionOverview>>> {
    let overview = state.billing.plans.overview(auth_user.user_id).await?;
    Ok(ApiResponse::ok(overview))
}

pub async fn list_plans(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<SubscriptionPlan>>>> {
    Ok(ApiResponse::ok(state.billing.plans.list_plans().await?))
}

/// Start an upgrade. Returns bank transfer details; the plan takes effect once
/// an admin confirms the payment.
pub async fn request_upgrade(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpgradeBody>,
) -> ApiResult<(StatusCode, Json<ApiResponse<UpgradeRequest>>)> {
    let account: CzechAccount = state
        .config
        .operator_bank_account
        .as_deref()
        .ok_or_else(|| {
            tracing::error!("OPERATOR_BANK_ACCOUNT not configured, cannot accept upgrades");
            ApiError::Internal
        })?
        .parse()?;

    let request = state
        .billing
        .subscriptions
        .request_upgrade(auth_user.user_id, body.plan_id, body.billing_cycle, &account)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(request)))
}
