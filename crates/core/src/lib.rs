//! Atelier Core - Shared domain types.
//!
//! This crate provides the types the storefront service and CLI share:
//! - `storefront` - HTTP service (checkout, webhooks, admin order management)
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Order and payment status machines, money
//! arithmetic and the checkout intent carried through the payment provider
//! all live here so they can be tested without any infrastructure.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, money, line items, contact snapshots, statuses
//!   and the checkout intent

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
