//! User entity and related types

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::canonical::Canonicalizer;
use super::validation::UserValidationError;

/// Opaque, stable user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = UserValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| UserValidationError::InvalidId(s.to_string()))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User account held by the directory
///
/// A fresh user has no identifier; one is assigned the first time the user is
/// persisted and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<UserId>,
    username: String,
    username_canonical: String,
    email: String,
    email_canonical: String,
    /// Opaque credential produced by the password hasher
    #[serde(skip_serializing, default)]
    password: String,
    /// Plaintext staged by the caller until the next update
    #[serde(skip, default)]
    plain_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation_token: Option<String>,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_login_at: Option<DateTime<Utc>>,
}

/// Every stored column of a user, used by backends to rebuild an entity
#[derive(Debug, Clone)]
pub struct PersistedUser {
    pub id: UserId,
    pub username: String,
    pub username_canonical: String,
    pub email: String,
    pub email_canonical: String,
    pub password: String,
    pub confirmation_token: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<PersistedUser> for User {
    fn from(p: PersistedUser) -> Self {
        Self {
            id: Some(p.id),
            username: p.username,
            username_canonical: p.username_canonical,
            email: p.email,
            email_canonical: p.email_canonical,
            password: p.password,
            plain_password: None,
            confirmation_token: p.confirmation_token,
            enabled: p.enabled,
            created_at: p.created_at,
            updated_at: p.updated_at,
            last_login_at: p.last_login_at,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl User {
    /// Create an empty, unpersisted, enabled user
    pub fn new() -> Self {
        let now = Utc::now();

        Self {
            id: None,
            username: String::new(),
            username_canonical: String::new(),
            email: String::new(),
            email_canonical: String::new(),
            password: String::new(),
            plain_password: None,
            confirmation_token: None,
            enabled: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    // Getters

    pub fn id(&self) -> Option<&UserId> {
        self.id.as_ref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn username_canonical(&self) -> &str {
        &self.username_canonical
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn email_canonical(&self) -> &str {
        &self.email_canonical
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn plain_password(&self) -> Option<&str> {
        self.plain_password.as_deref()
    }

    pub fn confirmation_token(&self) -> Option<&str> {
        self.confirmation_token.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    // Mutators

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
        self.touch();
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
        self.touch();
    }

    /// Stage a plaintext password; it is hashed on the next update
    pub fn set_plain_password(&mut self, password: impl Into<String>) {
        self.plain_password = Some(password.into());
        self.touch();
    }

    pub fn set_password(&mut self, hash: impl Into<String>) {
        self.password = hash.into();
        self.touch();
    }

    pub fn set_confirmation_token(&mut self, token: Option<String>) {
        self.confirmation_token = token;
        self.touch();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.touch();
    }

    pub fn record_login(&mut self) {
        self.last_login_at = Some(Utc::now());
    }

    /// Drop the staged plaintext password
    pub fn erase_credentials(&mut self) {
        self.plain_password = None;
    }

    /// Recompute both canonical fields from their source fields
    pub fn canonicalize(&mut self, canonicalizer: &dyn Canonicalizer) {
        self.username_canonical = canonicalizer.canonicalize(&self.username);
        self.email_canonical = canonicalizer.canonicalize(&self.email);
    }

    /// Return the identifier, assigning a fresh one if the user has none yet
    pub(crate) fn ensure_id(&mut self) -> UserId {
        *self.id.get_or_insert_with(UserId::generate)
    }

    /// Undo `ensure_id` after the first write was rejected
    pub(crate) fn clear_unpersisted_id(&mut self) {
        self.id = None;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
