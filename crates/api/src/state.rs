//! Application state shared across HTTP handlers

use std::sync::Arc;

use fakturace_billing::BillingService;
use sqlx::PgPool;

use crate::{
    auth::{AuthState, JwtManager, TokenManager},
    config::Config,
    email::{EmailConfig, EmailService},
    registry::{RegistryClient, RegistryError},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub jwt_manager: JwtManager,
    pub tokens: TokenManager,
    pub billing: BillingService,
    pub email: EmailService,
    pub registry: RegistryClient,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Result<Self, RegistryError> {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let billing = BillingService::new(pool.clone(), config.payment_webhook_secret.clone());
        let email = EmailService::new(EmailConfig::from_config(&config));
        let registry = RegistryClient::new(&config.ares_base_url, config.ares_timeout_secs)?;

        Ok(Self {
            tokens: TokenManager::new(pool.clone()),
            config: Arc::new(config),
            pool,
            jwt_manager,
            billing,
            email,
            registry,
        })
    }

    /// State for the auth middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            pool: self.pool.clone(),
        }
    }
}
