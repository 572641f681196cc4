//! API error types and the JSON response envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fakturace_billing::BillingError;
use serde::Serialize;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is deactivated")]
    AccountDisabled,
    #[error("Email already registered")]
    EmailAlreadyExists,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Monthly invoice limit reached ({used}/{limit})")]
    InvoiceLimitReached { limit: i32, used: i32 },

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),

    // Upstream errors
    #[error("Upstream service error: {0}")]
    Upstream(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Status, stable error code and the Czech message shown to the user
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            // Authentication
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Nesprávný e-mail nebo heslo".to_string(),
            ),
            ApiError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                "ACCOUNT_DISABLED",
                "Účet byl deaktivován".to_string(),
            ),
            ApiError::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                "EMAIL_EXISTS",
                "Tento e-mail je již registrován".to_string(),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Odkaz je neplatný nebo vypršel".to_string(),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Nejste přihlášeni".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "K této akci nemáte oprávnění".to_string(),
            ),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InvoiceLimitReached { limit, used } => (
                StatusCode::BAD_REQUEST,
                "INVOICE_LIMIT_REACHED",
                format!(
                    "Dosáhli jste měsíčního limitu faktur ({}/{}). Pro vytvoření další faktury přejděte na vyšší tarif.",
                    used, limit
                ),
            ),

            // Resources
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Záznam nebyl nalezen".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Upstream
            ApiError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Externí služba není dostupná".to_string(),
            ),

            // Internal
            ApiError::Database(_) | ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Došlo k neočekávané chybě, zkuste to prosím znovu".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = Json(json!({
            "success": false,
            "error": message,
            "errorCode": code,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Záznam již existuje".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvoiceLimitReached { limit, used } => {
                ApiError::InvoiceLimitReached { limit, used }
            }
            BillingError::InvalidTransition { from, action } => ApiError::Validation(format!(
                "Akci '{}' nelze provést u faktury ve stavu {}",
                action,
                from.label()
            )),
            BillingError::NotEditable(status) => ApiError::Validation(format!(
                "Upravovat lze pouze koncepty (aktuální stav: {})",
                status.label()
            )),
            BillingError::NoLineItems => {
                ApiError::Validation("Faktura musí obsahovat alespoň jednu položku".to_string())
            }
            BillingError::InvoiceNumberTaken(number) => {
                ApiError::Conflict(format!("Číslo faktury {} je již použito", number))
            }
            BillingError::InvalidInvoiceNumber(number) => ApiError::Validation(format!(
                "Neplatné číslo faktury {} (očekávaný formát RRRR-NNNNN)",
                number
            )),
            BillingError::NumberSequenceExhausted(year) => ApiError::Conflict(format!(
                "Číselná řada faktur pro rok {} je vyčerpána",
                year
            )),
            BillingError::DowngradeBlocked { used, limit } => ApiError::Validation(format!(
                "Uživatel v tomto měsíci vystavil {} faktur, cílový tarif povoluje {}",
                used, limit
            )),
            BillingError::InvalidAccount(account) => {
                ApiError::Validation(format!("Neplatné číslo účtu: {}", account))
            }
            BillingError::BankAccountMissing => ApiError::Validation(
                "Nejprve si v profilu nastavte číslo bankovního účtu".to_string(),
            ),
            BillingError::SubscriptionNotFound(_) => ApiError::NotFound,
            BillingError::InvalidSubscriptionState(msg) => ApiError::Validation(msg),
            BillingError::ClientInUse(count) => ApiError::Conflict(format!(
                "Klienta nelze smazat, je použit na {} fakturách",
                count
            )),
            BillingError::WebhookSignatureInvalid => ApiError::Unauthorized,
            BillingError::NotFound(what) => {
                tracing::debug!(what = %what, "Billing lookup found nothing");
                ApiError::NotFound
            }
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),
            BillingError::Database(msg) => {
                tracing::error!(error = %msg, "Billing database error");
                ApiError::Database(msg)
            }
            BillingError::Internal(msg) => {
                tracing::error!(error = %msg, "Billing internal error");
                ApiError::Internal
            }
        }
    }
}

/// Successful response envelope: `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fakturace_shared::InvoiceStatus;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_limit_reached_envelope() {
        let err: ApiError = BillingError::InvoiceLimitReached { limit: 4, used: 4 }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errorCode"], "INVOICE_LIMIT_REACHED");
        assert!(body["error"].as_str().unwrap().contains("4/4"));
    }

    #[tokio::test]
    async fn test_internal_errors_are_generic() {
        let err: ApiError = BillingError::Database("connection reset".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_billing_error_status_mapping() {
        let cases: Vec<(BillingError, StatusCode)> = vec![
            (BillingError::NotEditable(InvoiceStatus::Sent), StatusCode::BAD_REQUEST),
            (BillingError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (
                BillingError::InvoiceNumberTaken("2026-00001".to_string()),
                StatusCode::CONFLICT,
            ),
            (BillingError::ClientInUse(2), StatusCode::CONFLICT),
            (BillingError::WebhookSignatureInvalid, StatusCode::UNAUTHORIZED),
        ];

        for (billing, expected) in cases {
            let (status, _, _) = ApiError::from(billing).parts();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_success_envelope() {
        let Json(body) = ApiResponse::ok(vec![1, 2]);
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"][1], 2);
    }
}
