//! Identity Directory
//!
//! User account storage with a backend-agnostic repository interface:
//! - Case-insensitive lookups through canonical username/email fields
//! - Uniqueness checks that let a user being edited keep its own values
//! - In-memory and PostgreSQL backends
//! - Argon2 hashing of staged passwords

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{DomainError, UniquenessChecker, User, UserId, UserRepository};
