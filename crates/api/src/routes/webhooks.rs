//! Inbound payment notifications

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use fakturace_billing::{WebhookOutcome, SIGNATURE_HEADER};

use crate::{
    error::{ApiResponse, ApiResult},
    state::AppState,
};

/// Records the notification. Subscriptions are still activated by an admin.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<WebhookOutcome>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let outcome = state.billing.webhooks.handle(&body, signature).await?;
    Ok(ApiResponse::ok(outcome))
}
