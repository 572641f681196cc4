//! Error types shared across Fakturace crates

use thiserror::Error;

/// Startup failures of the shared infrastructure
#[derive(Debug, Error)]
pub enum FakturaError {
    #[error("Cannot connect to database: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl FakturaError {
    /// Whether retrying later could help (the server was unreachable)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FakturaError::Connect(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(FakturaError::Connect(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!FakturaError::Connect(sqlx::Error::RowNotFound).is_transient());
    }
}
