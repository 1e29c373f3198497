//! Atelier storefront library.
//!
//! Checkout, payment reconciliation, stock and order management behind an
//! axum router. The binary in `main.rs` wires it to configuration and a
//! listener; the integration tests drive [`app::build_router`] directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
