//! PostgreSQL user repository implementation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;

use super::password::Argon2Hasher;
use crate::config::PostgresConfig;
use crate::domain::user::{
    Canonicalizer, DefaultCanonicalizer, FieldValue, PasswordHasher, PersistedUser, User,
    UserCriteria, UserId, UserRepository, UserStream,
};
use crate::domain::DomainError;

const USER_COLUMNS: &str = "id, username, username_canonical, email, email_canonical, password, \
                            confirmation_token, enabled, created_at, updated_at, last_login_at";

const SELECT_ALL_USERS: &str = "SELECT id, username, username_canonical, email, email_canonical, \
                                password, confirmation_token, enabled, created_at, updated_at, \
                                last_login_at FROM users ORDER BY created_at, id";

/// Statements run by `ensure_schema`, in order. The partial unique indexes
/// allow any number of disabled users to share a canonical value.
const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username VARCHAR(180) NOT NULL,
        username_canonical VARCHAR(180) NOT NULL,
        email VARCHAR(254) NOT NULL,
        email_canonical VARCHAR(254) NOT NULL,
        password TEXT NOT NULL,
        confirmation_token VARCHAR(255),
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        last_login_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS users_username_canonical_enabled
        ON users (username_canonical) WHERE enabled AND username_canonical <> ''
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS users_email_canonical_enabled
        ON users (email_canonical) WHERE enabled AND email_canonical <> ''
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS users_confirmation_token
        ON users (confirmation_token)
    "#,
];

/// PostgreSQL implementation of UserRepository
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
    canonicalizer: Arc<dyn Canonicalizer>,
    hasher: Arc<dyn PasswordHasher>,
}

impl PostgresUserRepository {
    /// Create a repository over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self::with_components(
            pool,
            Arc::new(DefaultCanonicalizer),
            Arc::new(Argon2Hasher::new()),
        )
    }

    pub fn with_components(
        pool: PgPool,
        canonicalizer: Arc<dyn Canonicalizer>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            pool,
            canonicalizer,
            hasher,
        }
    }

    /// Open a connection pool from configuration
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                DomainError::persistence(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        info!("PostgreSQL connection established");
        Ok(Self::new(pool))
    }

    /// Create the users table and its indexes if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::persistence(format!("Failed to create users schema: {}", e))
                })?;
        }

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by(&self, criteria: &UserCriteria) -> Result<Option<User>, DomainError> {
        if !criteria.is_well_typed() {
            return Ok(None);
        }

        let mut query = find_query(criteria);
        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::persistence(format!("Failed to find user: {}", e)))?;

        row.as_ref().map(row_to_user).transpose()
    }

    fn find_users(&self) -> UserStream<'_> {
        sqlx::query(SELECT_ALL_USERS)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(|e| DomainError::persistence(format!("Failed to list users: {}", e)))
                    .and_then(|row| row_to_user(&row))
            })
            .boxed()
    }

    fn user_class(&self) -> &'static str {
        "postgres"
    }

    async fn persist(&self, user: &User) -> Result<(), DomainError> {
        let id = user
            .id()
            .ok_or_else(|| DomainError::internal("Cannot persist a user without an id"))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, username_canonical, email, email_canonical,
                               password, confirmation_token, enabled, created_at, updated_at,
                               last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username,
                username_canonical = EXCLUDED.username_canonical,
                email = EXCLUDED.email,
                email_canonical = EXCLUDED.email_canonical,
                password = EXCLUDED.password,
                confirmation_token = EXCLUDED.confirmation_token,
                enabled = EXCLUDED.enabled,
                updated_at = EXCLUDED.updated_at,
                last_login_at = EXCLUDED.last_login_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(user.username())
        .bind(user.username_canonical())
        .bind(user.email())
        .bind(user.email_canonical())
        .bind(user.password())
        .bind(user.confirmation_token())
        .bind(user.is_enabled())
        .bind(user.created_at())
        .bind(user.updated_at())
        .bind(user.last_login_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, user))?;

        Ok(())
    }

    async fn remove(&self, id: &UserId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::persistence(format!("Failed to delete user: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    fn canonicalizer(&self) -> &dyn Canonicalizer {
        self.canonicalizer.as_ref()
    }

    fn password_hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }
}

/// Compile criteria into `SELECT ... WHERE col = $n AND ... LIMIT 1`
fn find_query(criteria: &UserCriteria) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users WHERE TRUE", USER_COLUMNS));

    for (field, value) in criteria.iter() {
        builder.push(" AND ").push(field.column()).push(" = ");

        match value {
            FieldValue::Id(id) => builder.push_bind(*id.as_uuid()),
            FieldValue::Text(text) => builder.push_bind(text.clone()),
            FieldValue::Bool(flag) => builder.push_bind(*flag),
        };
    }

    if let Some(id) = criteria.excluded_id() {
        builder.push(" AND id <> ").push_bind(*id.as_uuid());
    }

    builder.push(" ORDER BY created_at, id LIMIT 1");
    builder
}

fn map_write_error(error: sqlx::Error, user: &User) -> DomainError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return match db_error.constraint() {
                Some(c) if c.contains("email") => {
                    DomainError::conflict(format!("Email '{}' already exists", user.email()))
                }
                Some(c) if c.contains("username") => {
                    DomainError::conflict(format!("Username '{}' already exists", user.username()))
                }
                _ => DomainError::conflict(format!("User violates a unique constraint: {}", error)),
            };
        }
    }

    DomainError::persistence(format!("Failed to save user: {}", error))
}

fn row_to_user(row: &PgRow) -> Result<User, DomainError> {
    let decode =
        |e: sqlx::Error| DomainError::persistence(format!("Failed to decode user row: {}", e));

    let persisted = PersistedUser {
        id: UserId::from_uuid(row.try_get("id").map_err(decode)?),
        username: row.try_get("username").map_err(decode)?,
        username_canonical: row.try_get("username_canonical").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        email_canonical: row.try_get("email_canonical").map_err(decode)?,
        password: row.try_get("password").map_err(decode)?,
        confirmation_token: row.try_get("confirmation_token").map_err(decode)?,
        enabled: row.try_get("enabled").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
        last_login_at: row.try_get("last_login_at").map_err(decode)?,
    };

    Ok(persisted.into())
}
