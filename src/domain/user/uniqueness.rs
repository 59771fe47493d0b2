//! Uniqueness checks for user-identifying fields

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::criteria::{UserCriteria, UserField};
use super::entity::UserId;
use super::repository::UserRepository;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Field whose canonical form must be unique among enabled users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    fn canonical_field(&self) -> UserField {
        match self {
            Self::Username => UserField::UsernameCanonical,
            Self::Email => UserField::EmailCanonical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl std::str::FromStr for UniqueField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "username" => Ok(Self::Username),
            "email" => Ok(Self::Email),
            other => Err(DomainError::validation(format!(
                "Unknown unique field '{}'",
                other
            ))),
        }
    }
}

/// Checks candidate values against existing enabled users
#[derive(Debug)]
pub struct UniquenessChecker<R: UserRepository + ?Sized> {
    repository: Arc<R>,
}

impl<R: UserRepository + ?Sized> UniquenessChecker<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Returns true iff no enabled user other than `exclude` holds the
    /// canonical form of `value` in `field`.
    pub async fn validate_unique(
        &self,
        value: &str,
        field: UniqueField,
        exclude: Option<&UserId>,
    ) -> Result<bool, DomainError> {
        let canonical = self.repository.canonicalizer().canonicalize(value);
        let mut criteria = UserCriteria::new()
            .with(field.canonical_field(), canonical)
            .with(UserField::Enabled, true);

        if let Some(id) = exclude {
            criteria = criteria.excluding(*id);
        }

        let unique = self.repository.find_user_by(&criteria).await?.is_none();

        debug!(field = field.as_str(), unique, "Uniqueness checked");
        Ok(unique)
    }
}

/// Context for a "unique value" rule evaluated against a candidate field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub field: UniqueField,
    /// User being edited, allowed to keep its own value
    pub exclude: Option<UserId>,
    pub message: String,
}

impl UniqueConstraint {
    pub fn new(field: UniqueField) -> Self {
        Self {
            field,
            exclude: None,
            message: format!("The {} is already used", field.as_str()),
        }
    }

    pub fn excluding(mut self, id: UserId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Uniqueness predicate consumed by validators
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UniquenessCheck: Send + Sync {
    async fn is_unique(&self, value: &str, constraint: &UniqueConstraint)
        -> Result<bool, DomainError>;
}

#[async_trait]
impl<R: UserRepository + ?Sized> UniquenessCheck for UniquenessChecker<R> {
    async fn is_unique(
        &self,
        value: &str,
        constraint: &UniqueConstraint,
    ) -> Result<bool, DomainError> {
        self.validate_unique(value, constraint.field, constraint.exclude.as_ref())
            .await
    }
}

/// Generic "unique value" rule; forwards to a uniqueness check
pub struct UniqueValidator<C: UniquenessCheck + ?Sized> {
    check: Arc<C>,
}

impl<C: UniquenessCheck + ?Sized> UniqueValidator<C> {
    pub fn new(check: Arc<C>) -> Self {
        Self { check }
    }

    pub async fn is_valid(
        &self,
        value: &str,
        constraint: &UniqueConstraint,
    ) -> Result<bool, DomainError> {
        self.check.is_unique(value, constraint).await
    }
}
