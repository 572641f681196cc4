//! Security headers middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Response},
    middleware::Next,
};

/// Which optional headers to send
#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy {
    /// Only meaningful when the API is served over HTTPS
    pub hsts: bool,
}

impl HeaderPolicy {
    pub fn for_public_url(public_url: &str) -> Self {
        Self {
            hsts: public_url.starts_with("https://"),
        }
    }
}

/// Adds security headers to all responses
pub async fn security_headers_middleware(
    State(policy): State<HeaderPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=(), payment=()"),
    );

    if policy.hsts {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    // JSON only, never rendered as a page
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    // Invoices and account data must not be cached by intermediaries
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, private"),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn plain() -> &'static str {
        "ok"
    }

    async fn cacheable() -> impl IntoResponse {
        ([(header::CACHE_CONTROL, "public, max-age=60")], "ok")
    }

    async fn call(policy: HeaderPolicy, uri: &str) -> Response<Body> {
        Router::new()
            .route("/", get(plain))
            .route("/cached", get(cacheable))
            .layer(middleware::from_fn_with_state(policy, security_headers_middleware))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_headers_added_with_hsts_on_https() {
        let policy = HeaderPolicy::for_public_url("https://fakturace.example.cz");
        let response = call(policy, "/").await;
        let headers = response.headers();

        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store, private");
        assert!(headers.get(header::CONTENT_SECURITY_POLICY).is_some());
        assert_eq!(
            headers.get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=31536000; includeSubDomains"
        );
    }

    #[tokio::test]
    async fn test_no_hsts_on_plain_http() {
        let policy = HeaderPolicy::for_public_url("http://localhost:3000");
        let response = call(policy, "/").await;
        assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_handler_cache_control_is_kept() {
        let response = call(HeaderPolicy { hsts: false }, "/cached").await;
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=60"
        );
    }
}
