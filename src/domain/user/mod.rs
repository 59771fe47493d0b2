//! User domain
//!
//! This module provides domain types and traits for the identity directory:
//! user entities, canonical fields, query criteria, the repository
//! capability interface and uniqueness checks.

mod canonical;
mod criteria;
mod entity;
mod password;
mod repository;
mod uniqueness;
mod validation;

pub use canonical::{Canonicalizer, DefaultCanonicalizer};
pub use criteria::{FieldValue, UserCriteria, UserField};
pub use entity::{PersistedUser, User, UserId};
pub use password::PasswordHasher;
pub use repository::{UserRepository, UserStream};
pub use uniqueness::{
    UniqueConstraint, UniqueField, UniqueValidator, UniquenessCheck, UniquenessChecker,
};
pub use validation::{validate_email, validate_password, validate_username, UserValidationError};

#[cfg(test)]
pub use repository::mock::MockUserRepository;
