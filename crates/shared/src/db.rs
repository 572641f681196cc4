//! Database utilities and connection management

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

use crate::error::FakturaError;

/// Create a database connection pool.
/// The statement cache is off so the pool works behind a transaction-mode PgBouncer.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?
        .statement_cache_capacity(0)
        .application_name("fakturace");

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Connect and bring the schema up to date in one step (used at startup)
pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, FakturaError> {
    let pool = create_pool(database_url, max_connections).await?;
    run_migrations(&pool).await?;
    tracing::info!(max_connections, "Database ready, migrations applied");
    Ok(pool)
}
