//! Invoice routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use fakturace_billing::{
    DueTerm, Invoice, InvoiceDraft, InvoiceFilter, InvoiceSummary, InvoiceWithItems, PaymentQr,
};
use fakturace_shared::PaginatedResponse;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiResponse, ApiResult},
    state::AppState,
};

/// Optional body of `send`. Without a number the next one in the series is used.
#[derive(Debug, Default, Deserialize)]
pub struct SendInvoiceRequest {
    #[serde(default)]
    pub invoice_number: Option<String>,
}

/// Optional body of `mark-paid`. Defaults to today.
#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    #[serde(default)]
    pub payment_date: Option<Date>,
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(filter): Query<InvoiceFilter>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<InvoiceSummary>>>> {
    let page = state.billing.invoices.list(auth_user.user_id, &filter).await?;
    Ok(ApiResponse::ok(page))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(draft): Json<InvoiceDraft>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvoiceWithItems>>)> {
    let invoice = state.billing.invoices.create(auth_user.user_id, draft).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<InvoiceWithItems>>> {
    let invoice = state.billing.invoices.get(auth_user.user_id, invoice_id).await?;
    Ok(ApiResponse::ok(invoice))
}

/// Replace the fields and items of a draft
pub async fn update_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    Json(draft): Json<InvoiceDraft>,
) -> ApiResult<Json<ApiResponse<InvoiceWithItems>>> {
    let invoice = state
        .billing
        .invoices
        .update(auth_user.user_id, invoice_id, draft)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.billing.invoices.delete(auth_user.user_id, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    body: Option<Json<SendInvoiceRequest>>,
) -> ApiResult<Json<ApiResponse<InvoiceWithItems>>> {
    let Json(req) = body.unwrap_or_default();
    let number = req
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let invoice = state
        .billing
        .invoices
        .send(auth_user.user_id, invoice_id, number)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    body: Option<Json<MarkPaidRequest>>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let Json(req) = body.unwrap_or_default();
    let invoice = state
        .billing
        .invoices
        .mark_paid(auth_user.user_id, invoice_id, req.payment_date)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn mark_unpaid(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let invoice = state
        .billing
        .invoices
        .mark_unpaid(auth_user.user_id, invoice_id)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn mark_partially_paid(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let invoice = state
        .billing
        .invoices
        .mark_partially_paid(auth_user.user_id, invoice_id)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn return_to_draft(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let invoice = state
        .billing
        .invoices
        .return_to_draft(auth_user.user_id, invoice_id)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let invoice = state.billing.invoices.cancel(auth_user.user_id, invoice_id).await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn activate_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Invoice>>> {
    let invoice = state
        .billing
        .invoices
        .activate(auth_user.user_id, invoice_id)
        .await?;
    Ok(ApiResponse::ok(invoice))
}

pub async fn duplicate_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvoiceWithItems>>)> {
    let invoice = state
        .billing
        .invoices
        .duplicate(auth_user.user_id, invoice_id)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(invoice)))
}

pub async fn payment_qr(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<PaymentQr>>> {
    let qr = state
        .billing
        .invoices
        .payment_qr(auth_user.user_id, invoice_id)
        .await?;
    Ok(ApiResponse::ok(qr))
}

pub async fn list_due_terms(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<DueTerm>>>> {
    Ok(ApiResponse::ok(state.billing.invoices.due_terms().await?))
}
