//! Admin API route handlers.
//!
//! Every handler except login takes [`RequireAdmin`](crate::middleware::RequireAdmin),
//! which only reads the admin session.

pub mod auth;
pub mod custom_orders;
pub mod orders;
pub mod products;

use serde::Deserialize;

/// Default page size for admin listings.
const DEFAULT_PAGE_SIZE: i64 = 50;

/// `?limit=&offset=` for admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
