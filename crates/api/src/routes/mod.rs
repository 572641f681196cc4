//! API routes

pub mod admin;
pub mod auth;
pub mod clients;
pub mod health;
pub mod invoices;
pub mod registry;
pub mod subscription;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{require_admin, require_auth},
    state::AppState,
};

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Extract client IP address from request headers.
/// Checks common proxy headers in order of preference.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("cf-connecting-ip")
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let public_api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/reset-password/request", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", post(auth::verify_email))
        // Signature checked by the handler
        .route("/webhooks/payment", post(webhooks::payment_webhook));

    let protected_api_routes = Router::new()
        // Account
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route("/auth/logout", post(auth::logout))
        // Clients
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:client_id",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        // Company registry
        .route("/registry/ico/:ico", get(registry::lookup_ico))
        .route("/registry/search", get(registry::search))
        // Invoices
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/invoices/:invoice_id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/:invoice_id/send", post(invoices::send_invoice))
        .route("/invoices/:invoice_id/mark-paid", post(invoices::mark_paid))
        .route("/invoices/:invoice_id/mark-unpaid", post(invoices::mark_unpaid))
        .route(
            "/invoices/:invoice_id/mark-partially-paid",
            post(invoices::mark_partially_paid),
        )
        .route(
            "/invoices/:invoice_id/return-to-draft",
            post(invoices::return_to_draft),
        )
        .route("/invoices/:invoice_id/cancel", post(invoices::cancel_invoice))
        .route("/invoices/:invoice_id/activate", post(invoices::activate_invoice))
        .route("/invoices/:invoice_id/duplicate", post(invoices::duplicate_invoice))
        .route("/invoices/:invoice_id/payment-qr", get(invoices::payment_qr))
        .route("/due-terms", get(invoices::list_due_terms))
        // Subscription
        .route("/subscription", get(subscription::get_subscription))
        .route("/subscription/plans", get(subscription::list_plans))
        .route("/subscription/upgrade", post(subscription::request_upgrade));

    let admin_api_routes = Router::new()
        .route("/admin/subscriptions", get(admin::subscriptions::list_subscriptions))
        .route(
            "/admin/subscriptions/:subscription_id/payments",
            get(admin::subscriptions::list_payments),
        )
        .route(
            "/admin/subscriptions/:subscription_id/confirm-payment",
            post(admin::subscriptions::confirm_payment),
        )
        .route(
            "/admin/subscriptions/:subscription_id/cancel",
            post(admin::subscriptions::cancel_subscription),
        )
        .route(
            "/admin/subscriptions/:subscription_id/reactivate",
            post(admin::subscriptions::reactivate_subscription),
        )
        .route(
            "/admin/subscriptions/:subscription_id/extend",
            post(admin::subscriptions::extend_subscription),
        )
        .route("/admin/users", get(admin::users::list_users))
        .route(
            "/admin/users/:user_id/deactivate",
            post(admin::users::deactivate_user),
        )
        .route(
            "/admin/users/:user_id/change-plan",
            post(admin::users::change_plan),
        )
        // Runs after require_auth has inserted the AuthUser
        .layer(middleware::from_fn(require_admin));

    let protected_api_routes = protected_api_routes
        .merge(admin_api_routes)
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let api_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogFormat, DEFAULT_ARES_BASE_URL};
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use fakturace_shared::UserRole;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret-with-at-least-32-chars";

    fn test_state() -> AppState {
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            public_url: "http://localhost:3000".to_string(),
            cors_origins: vec![],
            log_format: LogFormat::Pretty,
            database_url: "postgres://localhost:1/fakturace_test".to_string(),
            database_max_connections: 1,
            jwt_secret: SECRET.to_string(),
            jwt_expiry_hours: 1,
            enable_signup: true,
            operator_bank_account: None,
            payment_webhook_secret: None,
            resend_api_key: String::new(),
            email_from: "noreply@example.cz".to_string(),
            ares_base_url: DEFAULT_ARES_BASE_URL.to_string(),
            ares_timeout_secs: 1,
        };
        // Never connects unless a handler touches the database
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState::new(config, pool).unwrap()
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        create_router(test_state())
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_liveness_is_ok() {
        let status = status_of(Request::get("/health/live").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in ["/api/invoices", "/api/clients", "/api/subscription", "/api/auth/me"] {
            let status = status_of(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let status = status_of(
            Request::get("/api/admin/subscriptions")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let status = status_of(
            Request::get("/api/invoices")
                .header(AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_from_other_secret_is_unauthorized() {
        let other = crate::auth::JwtManager::new("another-secret-that-is-also-32-chars-long", 1);
        let issued = other
            .issue(Uuid::new_v4(), UserRole::Admin, "admin@example.cz")
            .unwrap();

        let status = status_of(
            Request::get("/api/admin/subscriptions")
                .header(AUTHORIZATION, format!("Bearer {}", issued.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_extract_client_ip_prefers_cloudflare() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
        headers.insert("cf-connecting-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("198.51.100.4"));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
