//! Domain layer - Core identity directory entities and contracts

pub mod error;
pub mod user;

pub use error::DomainError;
pub use user::{
    Canonicalizer, DefaultCanonicalizer, PasswordHasher, UniqueConstraint, UniqueField,
    UniqueValidator, UniquenessCheck, UniquenessChecker, User, UserCriteria, UserField, UserId,
    UserRepository,
};
