//! Authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use fakturace_shared::UserRole;
use sqlx::PgPool;
use uuid::Uuid;

use super::{jwt::JwtManager, sessions};
use crate::error::ApiError;

/// State needed by the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub pool: PgPool,
}

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub email: String,
    pub jti: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid access token backed by a live session
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = auth_state.jwt_manager.decode(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::Unauthorized
    })?;

    if !sessions::is_session_active(&auth_state.pool, &claims.jti).await? {
        tracing::debug!(user_id = %claims.sub, "Session revoked, expired or user inactive");
        return Err(ApiError::Unauthorized);
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: claims.email,
        jti: claims.jti,
    });

    Ok(next.run(request).await)
}

/// Require the admin role. Layered inside `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthorized)?;

    if !auth_user.is_admin() {
        tracing::warn!(user_id = %auth_user.user_id, path = %request.uri().path(), "Non-admin on admin route");
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn ok() -> &'static str {
        "ok"
    }

    fn admin_router(role: UserRole) -> Router {
        Router::new()
            .route("/admin", get(ok))
            .layer(middleware::from_fn(require_admin))
            .layer(Extension(AuthUser {
                user_id: Uuid::new_v4(),
                role,
                email: "someone@example.cz".to_string(),
                jti: "jti".to_string(),
            }))
    }

    #[tokio::test]
    async fn test_admin_route_rejects_regular_user() {
        let response = admin_router(UserRole::User)
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_route_allows_admin() {
        let response = admin_router(UserRole::Admin)
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_route_without_auth_user_is_unauthorized() {
        let app = Router::new()
            .route("/admin", get(ok))
            .layer(middleware::from_fn(require_admin));

        let response = app
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let basic = Request::builder()
            .header(AUTHORIZATION, "Basic dXNlcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&basic), None);
    }
}
