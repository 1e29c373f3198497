//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! ATELIER_ADMIN_PASSWORD='...' atelier-cli admin create -u alice
//! ```

use std::sync::Arc;

use thiserror::Error;

use atelier_storefront::db::PgAccountRepository;
use atelier_storefront::services::{AuthError, AuthService};

use super::{ConnectError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// User already exists.
    #[error("Admin user already exists: {0}")]
    UserExists(String),

    #[error(transparent)]
    Auth(AuthError),
}

/// Create a new admin user.
///
/// The password is hashed with the same Argon2 parameters the service uses
/// at login.
///
/// # Errors
///
/// Returns an error if the username is taken, the password is too weak, or
/// the database is unreachable.
pub async fn create_user(username: &str, password: &str) -> Result<(), AdminError> {
    let pool = connect().await?;
    let auth = AuthService::new(Arc::new(PgAccountRepository::new(pool)));

    tracing::info!("Creating admin user: {}", username);
    let admin = auth
        .create_admin(username, password)
        .await
        .map_err(|e| match e {
            AuthError::AlreadyExists => AdminError::UserExists(username.to_owned()),
            other => AdminError::Auth(other),
        })?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Username: {}",
        admin.id,
        admin.username
    );
    Ok(())
}
