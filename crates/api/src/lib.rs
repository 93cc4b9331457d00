// API crate clippy configuration
#![allow(clippy::single_match)] // Clearer in some cases
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Meridian API Library
//!
//! The HTTP server for the Meridian telehealth backend: checkout and intake,
//! Stripe webhooks, admin reporting, and visitor analytics.

pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
