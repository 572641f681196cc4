//! Company registry (ARES) lookup routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResponse, ApiResult},
    registry::{CompanyInfo, RegistryError},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: String,
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidIco(ico) => {
                ApiError::Validation(format!("Neplatné IČO: {}", ico))
            }
            RegistryError::NotFound => ApiError::NotFound,
            RegistryError::QueryTooShort => ApiError::Validation(
                "Zadejte alespoň 3 znaky názvu firmy".to_string(),
            ),
            RegistryError::Upstream(status) => {
                ApiError::Upstream(format!("ARES returned {}", status))
            }
            RegistryError::Http(e) => {
                tracing::error!(error = %e, "ARES request failed");
                ApiError::Upstream(e.to_string())
            }
        }
    }
}

pub async fn lookup_ico(
    State(state): State<AppState>,
    Path(ico): Path<String>,
) -> ApiResult<Json<ApiResponse<CompanyInfo>>> {
    let company = state.registry.lookup_ico(&ico).await?;
    Ok(ApiResponse::ok(company))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<ApiResponse<Vec<CompanyInfo>>>> {
    let companies = state.registry.search_by_name(&query.name).await?;
    Ok(ApiResponse::ok(companies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn test_registry_errors_map_to_statuses() {
        let cases = [
            (RegistryError::InvalidIco("1".to_string()), StatusCode::BAD_REQUEST),
            (RegistryError::NotFound, StatusCode::NOT_FOUND),
            (RegistryError::QueryTooShort, StatusCode::BAD_REQUEST),
            (RegistryError::Upstream(503), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
