//! Typed query predicates over user fields

use std::collections::BTreeMap;

use super::entity::{User, UserId};

/// Fields a user can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserField {
    Id,
    Username,
    UsernameCanonical,
    Email,
    EmailCanonical,
    ConfirmationToken,
    Enabled,
}

impl UserField {
    /// Column name used by relational backends
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::UsernameCanonical => "username_canonical",
            Self::Email => "email",
            Self::EmailCanonical => "email_canonical",
            Self::ConfirmationToken => "confirmation_token",
            Self::Enabled => "enabled",
        }
    }

    /// Whether `value` has the type this field is stored as
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::Id, FieldValue::Id(_))
                | (Self::Enabled, FieldValue::Bool(_))
                | (
                    Self::Username
                        | Self::UsernameCanonical
                        | Self::Email
                        | Self::EmailCanonical
                        | Self::ConfirmationToken,
                    FieldValue::Text(_)
                )
        )
    }
}

/// Expected value for a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Id(UserId),
    Text(String),
    Bool(bool),
}

impl From<UserId> for FieldValue {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Conjunction of field equalities, optionally skipping one user id.
/// An empty criteria matches every user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCriteria {
    fields: BTreeMap<UserField, FieldValue>,
    exclude_id: Option<UserId>,
}

impl UserCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`, replacing any earlier entry for it
    pub fn with(mut self, field: UserField, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn id(id: UserId) -> Self {
        Self::new().with(UserField::Id, id)
    }

    /// Skip the user with this id
    pub fn excluding(mut self, id: UserId) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn excluded_id(&self) -> Option<&UserId> {
        self.exclude_id.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.exclude_id.is_none()
    }

    /// False when some entry pairs a field with a value of the wrong type,
    /// in which case no user can match.
    pub fn is_well_typed(&self) -> bool {
        self.fields.iter().all(|(field, value)| field.accepts(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserField, &FieldValue)> {
        self.fields.iter()
    }

    /// Evaluate the predicate against an in-memory user
    pub fn matches(&self, user: &User) -> bool {
        if self.exclude_id.is_some() && user.id() == self.exclude_id.as_ref() {
            return false;
        }

        self.fields.iter().all(|(field, expected)| match (field, expected) {
            (UserField::Id, FieldValue::Id(id)) => user.id() == Some(id),
            (UserField::Username, FieldValue::Text(v)) => user.username() == v,
            (UserField::UsernameCanonical, FieldValue::Text(v)) => user.username_canonical() == v,
            (UserField::Email, FieldValue::Text(v)) => user.email() == v,
            (UserField::EmailCanonical, FieldValue::Text(v)) => user.email_canonical() == v,
            (UserField::ConfirmationToken, FieldValue::Text(v)) => {
                user.confirmation_token() == Some(v.as_str())
            }
            (UserField::Enabled, FieldValue::Bool(v)) => user.is_enabled() == *v,
            _ => false,
        })
    }
}
