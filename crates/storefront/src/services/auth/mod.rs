//! Authentication service.
//!
//! Password login for customers (by email) and admins (by username).
//! Passwords are stored as Argon2id PHC strings.

mod error;

use std::sync::{Arc, LazyLock};

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use atelier_core::Email;

use crate::db::{AccountRepository, RepositoryError};
use crate::models::{AdminUser, Customer};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum length for names and usernames.
const MAX_NAME_LENGTH: usize = 120;

/// Hash checked when an admin username does not exist, so an unknown
/// username costs the same as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("not-a-real-password").ok());

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
}

impl AuthService {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::AlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register_customer(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Customer, AuthError> {
        let email = Email::parse(email)?;
        let name = validate_name(name, "name is required")?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.accounts
            .create_customer(&email, name, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::AlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login_customer(&self, email: &str, password: &str) -> Result<Customer, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some(credentials) = self.accounts.customer_credentials(&email).await? else {
            verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };
        verify_password(password, &credentials.password_hash)?;

        Ok(credentials.account)
    }

    // =========================================================================
    // Admins
    // =========================================================================

    /// Create an admin account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::AlreadyExists` if the username is taken.
    #[instrument(skip(self, password))]
    pub async fn create_admin(&self, username: &str, password: &str) -> Result<AdminUser, AuthError> {
        let username = validate_name(username, "username is required")?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.accounts
            .create_admin(username, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::AlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Login with username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the username/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login_admin(&self, username: &str, password: &str) -> Result<AdminUser, AuthError> {
        let Some(credentials) = self.accounts.admin_credentials(username.trim()).await? else {
            verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };
        verify_password(password, &credentials.password_hash)?;

        Ok(credentials.account)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

fn validate_name<'a>(value: &'a str, missing: &'static str) -> Result<&'a str, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::InvalidName(missing));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName("name is too long"));
    }
    Ok(value)
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

fn verify_dummy(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryAccountRepository;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryAccountRepository::default()))
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(verify_password("wrong horse", &hash).is_err());
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }

    #[tokio::test]
    async fn test_customer_register_and_login() {
        let auth = service();
        let customer = auth
            .register_customer("Ada@Shop.Example", "Ada", "analytical")
            .await
            .unwrap();
        assert_eq!(customer.email.as_str(), "ada@shop.example");

        assert!(matches!(
            auth.register_customer("ada@shop.example", "Ada", "analytical").await,
            Err(AuthError::AlreadyExists)
        ));

        let logged_in = auth.login_customer("ada@shop.example", "analytical").await.unwrap();
        assert_eq!(logged_in.id, customer.id);
        assert!(matches!(
            auth.login_customer("ada@shop.example", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login_customer("nobody@shop.example", "analytical").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_admin_login() {
        let auth = service();
        auth.create_admin("owner", "s3cure-pass").await.unwrap();

        assert!(auth.login_admin("owner", "s3cure-pass").await.is_ok());
        assert!(matches!(
            auth.login_admin("owner", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login_admin("ghost", "s3cure-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
