//! Client (odběratel) routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use fakturace_billing::{Client, ClientInput};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiResponse, ApiResult},
    state::AppState,
};

pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ApiResponse<Vec<Client>>>> {
    let clients = state.billing.clients.list(auth_user.user_id).await?;
    Ok(ApiResponse::ok(clients))
}

pub async fn create_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(input): Json<ClientInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Client>>)> {
    let client = state.billing.clients.create(auth_user.user_id, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Client>>> {
    let client = state.billing.clients.get(auth_user.user_id, client_id).await?;
    Ok(ApiResponse::ok(client))
}

pub async fn update_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
    Json(input): Json<ClientInput>,
) -> ApiResult<Json<ApiResponse<Client>>> {
    let client = state
        .billing
        .clients
        .update(auth_user.user_id, client_id, input)
        .await?;
    Ok(ApiResponse::ok(client))
}

/// Fails with a conflict while any invoice still references the client
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.billing.clients.delete(auth_user.user_id, client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
