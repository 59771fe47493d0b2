//! Repository factory for runtime backend selection

use std::sync::Arc;

use tracing::info;

use super::postgres_repository::PostgresUserRepository;
use super::repository::InMemoryUserRepository;
use crate::config::StorageConfig;
use crate::domain::user::UserRepository;
use crate::domain::DomainError;

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Factory for creating user repositories
#[derive(Debug)]
pub struct UserRepositoryFactory;

impl UserRepositoryFactory {
    /// Creates the repository selected by the configuration
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn UserRepository>, DomainError> {
        let storage_type = StorageType::from_str(&config.backend).ok_or_else(|| {
            DomainError::configuration(format!("Unknown storage backend '{}'", config.backend))
        })?;

        info!("Storage backend: {:?}", storage_type);

        match storage_type {
            StorageType::InMemory => Ok(Arc::new(InMemoryUserRepository::new())),
            StorageType::Postgres => {
                let repository = PostgresUserRepository::connect(&config.postgres).await?;

                if config.postgres.ensure_schema {
                    repository.ensure_schema().await?;
                }

                Ok(Arc::new(repository))
            }
        }
    }
}
