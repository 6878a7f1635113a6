//! # Tessera Server
//!
//! HTTP front end for the Tessera authentication core: password login,
//! refresh-token exchange, logout and role-gated routes, built on Axum.

pub mod auth;
pub mod errors;
pub mod infra;
pub mod routes;

pub use errors::{AppError, AppResult};
pub use infra::app_state::AppState;
