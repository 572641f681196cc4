//! Fakturace API Library
//!
//! HTTP server components for the Fakturace invoicing backend.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod registry;
pub mod routes;
pub mod security;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
