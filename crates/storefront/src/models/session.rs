//! Session-related types.
//!
//! Types stored in the session for authentication state. The customer and
//! admin scopes use separate cookies and separate keys, so a principal from
//! one scope can never be read back in the other.

use serde::{Deserialize, Serialize};

use atelier_core::{AdminUserId, CustomerId, Email};

/// Session-stored customer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentCustomer {
    pub id: CustomerId,
    pub email: Email,
}

/// Session-stored admin identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentAdmin {
    pub id: AdminUserId,
    pub username: String,
}

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for the logged-in customer (customer session only).
    pub const CURRENT_CUSTOMER: &str = "current_customer";

    /// Key for the logged-in admin (admin session only).
    pub const CURRENT_ADMIN: &str = "current_admin";

    /// Key for the CSRF token bound to the session.
    pub const CSRF_TOKEN: &str = "csrf_token";
}
