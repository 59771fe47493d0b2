//! User infrastructure module
//!
//! Storage backends for the user repository (in-memory and PostgreSQL),
//! Argon2 password hashing, confirmation tokens, and backend selection.

mod factory;
mod password;
mod postgres_repository;
mod repository;
mod token;

pub use factory::{StorageType, UserRepositoryFactory};
pub use password::Argon2Hasher;
pub use postgres_repository::PostgresUserRepository;
pub use repository::InMemoryUserRepository;
pub use token::TokenGenerator;
