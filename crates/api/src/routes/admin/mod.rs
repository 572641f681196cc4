//! Platform admin routes
//!
//! - `subscriptions`: listing, payment confirmation and manual state changes
//! - `users`: listing, deactivation and plan changes
//!
//! Every handler sits behind `require_auth` and `require_admin`.

pub mod subscriptions;
pub mod users;
