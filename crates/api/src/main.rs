//! Fakturace API server

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
};
use fakturace_api::{
    config::LogFormat, routes::create_router, security::HeaderPolicy, AppState, Config,
};
use fakturace_shared::connect_and_migrate;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fakturace_api=info,fakturace_billing=info,tower_http=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address,
        signup_enabled = config.enable_signup,
        "Starting Fakturace API"
    );

    let pool = match connect_and_migrate(&config.database_url, config.database_max_connections).await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, transient = e.is_transient(), "Database initialization failed");
            return Err(e.into());
        }
    };

    if config.operator_bank_account.is_none() {
        tracing::warn!("OPERATOR_BANK_ACCOUNT not set, subscription upgrades are unavailable");
    }

    let bind_address = config.bind_address.clone();
    let cors = cors_layer(&config.cors_origins);
    let header_policy = HeaderPolicy::for_public_url(&config.public_url);

    let state = AppState::new(config, pool).context("Failed to build application state")?;

    let app = create_router(state)
        .layer(middleware::from_fn_with_state(
            header_policy,
            fakturace_api::security::security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
