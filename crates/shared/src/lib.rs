#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Fakturace Shared Types and Utilities
//!
//! This crate contains types, errors, and utilities shared across the Fakturace crates.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
