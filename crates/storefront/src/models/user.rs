//! Account domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use atelier_core::{AdminUserId, CustomerId, Email};

/// A storefront customer account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub email: Email,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// An operator who can manage orders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: AdminUserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
