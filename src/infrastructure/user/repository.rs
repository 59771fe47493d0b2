//! In-memory user repository implementation

use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::password::Argon2Hasher;
use crate::domain::user::{
    Canonicalizer, DefaultCanonicalizer, PasswordHasher, User, UserCriteria, UserId,
    UserRepository, UserStream,
};
use crate::domain::DomainError;

/// In-memory implementation of UserRepository
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    canonicalizer: Arc<dyn Canonicalizer>,
    hasher: Arc<dyn PasswordHasher>,
}

impl InMemoryUserRepository {
    /// Create an empty repository using Argon2 and the default canonicalizer
    pub fn new() -> Self {
        Self::with_components(Arc::new(DefaultCanonicalizer), Arc::new(Argon2Hasher::new()))
    }

    pub fn with_components(
        canonicalizer: Arc<dyn Canonicalizer>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            canonicalizer,
            hasher,
        }
    }

    /// Create a repository with initial users; users without an id are skipped
    pub fn with_users(users: Vec<User>) -> Self {
        let repository = Self::new();
        let users_map = users
            .into_iter()
            .filter_map(|user| user.id().copied().map(|id| (id, user)))
            .collect();

        Self {
            users: Arc::new(RwLock::new(users_map)),
            ..repository
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject a write that would give a second enabled user the same canonical
/// username or email.
fn check_enabled_uniqueness(
    users: &HashMap<UserId, User>,
    candidate: &User,
) -> Result<(), DomainError> {
    if !candidate.is_enabled() {
        return Ok(());
    }

    let others = users
        .values()
        .filter(|u| u.is_enabled() && u.id() != candidate.id());

    for other in others {
        if !candidate.username_canonical().is_empty()
            && other.username_canonical() == candidate.username_canonical()
        {
            return Err(DomainError::conflict(format!(
                "Username '{}' already exists",
                candidate.username()
            )));
        }

        if !candidate.email_canonical().is_empty()
            && other.email_canonical() == candidate.email_canonical()
        {
            return Err(DomainError::conflict(format!(
                "Email '{}' already exists",
                candidate.email()
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_user_by(&self, criteria: &UserCriteria) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| criteria.matches(u))
            .min_by_key(|u| (u.created_at(), u.id().copied()))
            .cloned())
    }

    fn find_users(&self) -> UserStream<'_> {
        let users = Arc::clone(&self.users);

        stream::once(async move {
            let mut snapshot: Vec<User> = users.read().await.values().cloned().collect();
            snapshot.sort_by_key(|u| (u.created_at(), u.id().copied()));
            stream::iter(snapshot.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    fn user_class(&self) -> &'static str {
        "memory"
    }

    async fn persist(&self, user: &User) -> Result<(), DomainError> {
        let id = *user
            .id()
            .ok_or_else(|| DomainError::internal("Cannot persist a user without an id"))?;

        let mut users = self.users.write().await;
        check_enabled_uniqueness(&users, user)?;
        users.insert(id, user.clone());

        Ok(())
    }

    async fn remove(&self, id: &UserId) -> Result<bool, DomainError> {
        let mut users = self.users.write().await;
        Ok(users.remove(id).is_some())
    }

    fn canonicalizer(&self) -> &dyn Canonicalizer {
        self.canonicalizer.as_ref()
    }

    fn password_hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{PersistedUser, UniqueField, UniquenessChecker, UserField};
    use chrono::{DateTime, Duration, Utc};
    use futures::TryStreamExt;

    async fn save(repo: &InMemoryUserRepository, username: &str, email: &str) -> User {
        let mut user = repo.create_user();
        user.set_username(username);
        user.set_email(email);
        repo.update_user(&mut user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = InMemoryUserRepository::new();
        let user = save(&repo, "testuser", "test@x.com").await;

        let retrieved = repo.find_user_by_id(user.id().unwrap()).await.unwrap();
        assert_eq!(retrieved.unwrap().username(), "testuser");
    }

    #[tokio::test]
    async fn test_find_by_username_and_email() {
        let repo = InMemoryUserRepository::new();
        let user = save(&repo, "TestUser", "Test@X.com").await;

        let by_name = repo.find_user_by_username("testuser").await.unwrap();
        assert_eq!(by_name.unwrap().id(), user.id());

        let by_email = repo.find_user_by_email("TEST@x.COM").await.unwrap();
        assert_eq!(by_email.unwrap().id(), user.id());

        let not_found = repo.find_user_by_username("nonexistent").await.unwrap();
        assert!(not_found.is_none());
    }

    #[tokio::test]
    async fn test_find_user_by_criteria() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "alice", "alice@x.com").await;
        let bob = save(&repo, "bob", "bob@x.com").await;

        let criteria = UserCriteria::new()
            .with(UserField::Email, "bob@x.com")
            .with(UserField::Enabled, true);
        let found = repo.find_user_by(&criteria).await.unwrap();
        assert_eq!(found.unwrap().id(), bob.id());

        let criteria = UserCriteria::new().with(UserField::Username, "BOB");
        assert!(repo.find_user_by(&criteria).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_enabled_username_is_rejected() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "sameusername", "one@x.com").await;

        let mut other = repo.create_user();
        other.set_username("SameUsername");
        other.set_email("two@x.com");

        let err = repo.update_user(&mut other).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(err.is_persistence());
        assert_eq!(repo.len().await, 1);
        assert!(!other.is_persisted());
    }

    #[tokio::test]
    async fn test_rejected_new_user_can_be_saved_later() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "bob", "bob@x.com").await;

        let mut other = repo.create_user();
        other.set_username("BOB");
        other.set_email("other@x.com");
        assert!(repo.update_user(&mut other).await.is_err());
        assert!(other.id().is_none());

        other.set_username("robert");
        repo.update_user(&mut other).await.unwrap();

        let found = repo.find_user_by_username("robert").await.unwrap().unwrap();
        assert_eq!(found.id(), other.id());
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_enabled_email_is_rejected() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "one", "same@x.com").await;

        let mut other = repo.create_user();
        other.set_username("two");
        other.set_email("SAME@x.com");

        let err = repo.update_user(&mut other).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_disabled_users_may_share_canonical_fields() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "bob", "bob@x.com").await;

        let mut retired = repo.create_user();
        retired.set_username("Bob");
        retired.set_email("bob@x.com");
        retired.set_enabled(false);

        repo.update_user(&mut retired).await.unwrap();
        assert_eq!(repo.len().await, 2);

        // Re-enabling would create a second enabled holder
        retired.set_enabled(true);
        assert!(repo.update_user(&mut retired).await.is_err());
    }

    #[tokio::test]
    async fn test_update_changes_lookup() {
        let repo = InMemoryUserRepository::new();
        let mut user = save(&repo, "testuser", "test@x.com").await;

        user.set_username("NewUsername");
        repo.update_user(&mut user).await.unwrap();

        assert!(repo.find_user_by_username("testuser").await.unwrap().is_none());

        let found = repo.find_user_by_username("newusername").await.unwrap();
        assert_eq!(found.unwrap().id(), user.id());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_user_hashes_staged_password() {
        let repo = InMemoryUserRepository::new();
        let mut user = repo.create_user();
        user.set_username("bob");
        user.set_email("bob@x.com");
        user.set_plain_password("secure_password123");

        repo.update_user(&mut user).await.unwrap();

        assert!(user.plain_password().is_none());
        let stored = repo.find_user_by_username("bob").await.unwrap().unwrap();
        assert!(stored.plain_password().is_none());
        assert!(repo
            .password_hasher()
            .verify("secure_password123", stored.password()));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryUserRepository::new();
        let user = save(&repo, "testuser", "test@x.com").await;

        repo.delete_user(&user).await.unwrap();

        let criteria = UserCriteria::id(*user.id().unwrap());
        assert!(repo.find_user_by(&criteria).await.unwrap().is_none());
        assert!(repo.find_user_by_username("testuser").await.unwrap().is_none());

        let err = repo.delete_user(&user).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_find_users_streams_fresh_snapshots() {
        let repo = InMemoryUserRepository::new();
        save(&repo, "user1", "u1@x.com").await;
        save(&repo, "user2", "u2@x.com").await;

        let all: Vec<User> = repo.find_users().try_collect().await.unwrap();
        assert_eq!(all.len(), 2);

        save(&repo, "user3", "u3@x.com").await;

        let again: Vec<User> = repo.find_users().try_collect().await.unwrap();
        assert_eq!(again.len(), 3);
    }

    #[tokio::test]
    async fn test_with_users() {
        let seed = InMemoryUserRepository::new();
        let users = vec![
            save(&seed, "user1", "u1@x.com").await,
            save(&seed, "user2", "u2@x.com").await,
            seed.create_user(),
        ];

        let repo = InMemoryUserRepository::with_users(users);

        assert_eq!(repo.len().await, 2);
        assert!(repo.find_user_by_username("user1").await.unwrap().is_some());
    }

    fn seeded(name: &str, created_at: DateTime<Utc>) -> User {
        User::from(PersistedUser {
            id: UserId::generate(),
            username: name.to_string(),
            username_canonical: name.to_string(),
            email: format!("{}@x.com", name),
            email_canonical: format!("{}@x.com", name),
            password: String::new(),
            confirmation_token: None,
            enabled: true,
            created_at,
            updated_at: created_at,
            last_login_at: None,
        })
    }

    #[tokio::test]
    async fn test_find_user_by_returns_oldest_match() {
        let base = Utc::now();
        let users = (0..5)
            .rev()
            .map(|i| seeded(&format!("user{}", i), base + Duration::seconds(i)))
            .collect();
        let repo = InMemoryUserRepository::with_users(users);

        let criteria = UserCriteria::new().with(UserField::Enabled, true);
        for _ in 0..10 {
            let found = repo.find_user_by(&criteria).await.unwrap().unwrap();
            assert_eq!(found.username(), "user0");
        }

        let listed: Vec<User> = repo.find_users().try_collect().await.unwrap();
        let names: Vec<&str> = listed.iter().map(|u| u.username()).collect();
        assert_eq!(names, ["user0", "user1", "user2", "user3", "user4"]);
    }

    #[tokio::test]
    async fn test_user_class() {
        assert_eq!(InMemoryUserRepository::new().user_class(), "memory");
    }

    #[tokio::test]
    async fn test_uniqueness_checker_over_in_memory_store() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let bob = save(&repo, "Bob", "bob@x.com").await;

        let found = repo
            .find_user_by_username_or_email("BOB")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), bob.id());

        let checker = UniquenessChecker::new(Arc::clone(&repo));
        let second = repo.create_user();

        assert!(!checker
            .validate_unique("bob@x.com", UniqueField::Email, second.id())
            .await
            .unwrap());
        assert!(checker
            .validate_unique("BOB@X.COM", UniqueField::Email, bob.id())
            .await
            .unwrap());
    }
}
