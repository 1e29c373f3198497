//! Customer and admin accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use atelier_core::{AdminUserId, CustomerId, Email};

use super::RepositoryError;
use crate::models::{AdminUser, Customer};

/// An account together with its stored password hash.
#[derive(Debug, Clone)]
pub struct Credentials<T> {
    pub account: T,
    pub password_hash: String,
}

/// Storage for accounts.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_customer(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
    ) -> Result<Customer, RepositoryError>;

    async fn customer_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials<Customer>>, RepositoryError>;

    /// Returns `RepositoryError::Conflict` if the username is taken.
    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<AdminUser, RepositoryError>;

    async fn admin_credentials(
        &self,
        username: &str,
    ) -> Result<Option<Credentials<AdminUser>>, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: CustomerId,
    email: String,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Credentials<Customer> {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            account: Customer {
                id: row.id,
                email,
                name: row.name,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AdminUserRow {
    id: AdminUserId,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<AdminUserRow> for Credentials<AdminUser> {
    fn from(row: AdminUserRow) -> Self {
        Self {
            account: AdminUser {
                id: row.id,
                username: row.username,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        }
    }
}

/// `PostgreSQL` account repository.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create_customer(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
    ) -> Result<Customer, RepositoryError> {
        let row: CustomerRow = sqlx::query_as(
            "INSERT INTO customers (id, email, name, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, name, password_hash, created_at",
        )
        .bind(CustomerId::generate())
        .bind(email.as_str())
        .bind(name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "email"))?;

        Ok(Credentials::try_from(row)?.account)
    }

    async fn customer_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials<Customer>>, RepositoryError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT id, email, name, password_hash, created_at FROM customers WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credentials::try_from).transpose()
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<AdminUser, RepositoryError> {
        let row: AdminUserRow = sqlx::query_as(
            "INSERT INTO admin_users (id, username, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, username, password_hash, created_at",
        )
        .bind(AdminUserId::generate())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "username"))?;

        Ok(Credentials::from(row).account)
    }

    async fn admin_credentials(
        &self,
        username: &str,
    ) -> Result<Option<Credentials<AdminUser>>, RepositoryError> {
        let row: Option<AdminUserRow> = sqlx::query_as(
            "SELECT id, username, password_hash, created_at FROM admin_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credentials::from))
    }
}
