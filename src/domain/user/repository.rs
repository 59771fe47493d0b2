//! User repository trait

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::Debug;
use tracing::{debug, info};

use super::canonical::Canonicalizer;
use super::criteria::{UserCriteria, UserField};
use super::entity::{User, UserId};
use super::password::PasswordHasher;
use crate::domain::DomainError;

/// Lazy sequence of users produced by a single backend query
pub type UserStream<'a> = BoxStream<'a, Result<User, DomainError>>;

/// Capability interface over a user store
///
/// Backends provide the primitive operations (`find_user_by`, `find_users`,
/// `persist`, `remove`) plus the canonicalizer and hasher they were built
/// with. Lookups by username/email, canonical field maintenance, password
/// staging and deletion semantics are shared by every backend.
#[async_trait]
pub trait UserRepository: Send + Sync + Debug {
    /// Find the first user matching every entry of `criteria`
    async fn find_user_by(&self, criteria: &UserCriteria) -> Result<Option<User>, DomainError>;

    /// Stream every stored user. Each call issues a fresh query.
    fn find_users(&self) -> UserStream<'_>;

    /// Name of the concrete user representation behind this repository
    fn user_class(&self) -> &'static str;

    /// Insert or replace a user. The user must already carry an id and
    /// up-to-date canonical fields.
    async fn persist(&self, user: &User) -> Result<(), DomainError>;

    /// Remove a user by id, returning whether a record was removed
    async fn remove(&self, id: &UserId) -> Result<bool, DomainError>;

    fn canonicalizer(&self) -> &dyn Canonicalizer;

    fn password_hasher(&self) -> &dyn PasswordHasher;

    /// Create an empty user. Nothing is stored until `update_user`.
    fn create_user(&self) -> User {
        User::new()
    }

    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError> {
        self.find_user_by(&UserCriteria::id(*id)).await
    }

    /// Case-insensitive lookup through the canonical username
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        let canonical = self.canonicalizer().canonicalize(username);
        self.find_user_by(&UserCriteria::new().with(UserField::UsernameCanonical, canonical))
            .await
    }

    /// Case-insensitive lookup through the canonical email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let canonical = self.canonicalizer().canonicalize(email);
        self.find_user_by(&UserCriteria::new().with(UserField::EmailCanonical, canonical))
            .await
    }

    /// Values containing '@' are looked up as emails, anything else as a username
    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, DomainError> {
        if username_or_email.contains('@') {
            self.find_user_by_email(username_or_email).await
        } else {
            self.find_user_by_username(username_or_email).await
        }
    }

    async fn find_user_by_confirmation_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, DomainError> {
        self.find_user_by(&UserCriteria::new().with(UserField::ConfirmationToken, token))
            .await
    }

    /// Create or update a user
    ///
    /// Canonical fields are recomputed, a staged password is hashed, and a new
    /// user receives its identifier before being written.
    async fn update_user(&self, user: &mut User) -> Result<(), DomainError> {
        self.update_canonical_fields(user);
        self.update_password(user)?;

        let created = !user.is_persisted();
        let id = user.ensure_id();

        if let Err(err) = self.persist(user).await {
            if created {
                user.clear_unpersisted_id();
            }
            return Err(err);
        }

        if created {
            info!(user_id = %id, backend = self.user_class(), "User created");
        } else {
            debug!(user_id = %id, backend = self.user_class(), "User updated");
        }

        Ok(())
    }

    fn update_canonical_fields(&self, user: &mut User) {
        user.canonicalize(self.canonicalizer());
    }

    /// Hash and store a staged plaintext password, then clear it
    fn update_password(&self, user: &mut User) -> Result<(), DomainError> {
        let Some(plain) = user.plain_password().filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let hash = self.password_hasher().hash(plain)?;
        user.set_password(hash);
        user.erase_credentials();

        Ok(())
    }

    async fn delete_user(&self, user: &User) -> Result<(), DomainError> {
        let id = user
            .id()
            .ok_or_else(|| DomainError::not_found("User has never been persisted"))?;

        if !self.remove(id).await? {
            return Err(DomainError::not_found(format!("User '{}' not found", id)));
        }

        info!(user_id = %id, backend = self.user_class(), "User deleted");
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::user::DefaultCanonicalizer;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Reversible stand-in for a real hasher
    #[derive(Debug, Default)]
    pub struct PlainTextHasher;

    impl PasswordHasher for PlainTextHasher {
        fn hash(&self, password: &str) -> Result<String, DomainError> {
            Ok(format!("hashed:{}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash.strip_prefix("hashed:") == Some(password)
        }
    }

    /// Mock user repository for testing
    #[derive(Debug, Default)]
    pub struct MockUserRepository {
        users: Arc<Mutex<Vec<User>>>,
        should_fail: AtomicBool,
        canonicalizer: DefaultCanonicalizer,
        hasher: PlainTextHasher,
    }

    impl MockUserRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Set whether writes should fail
        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.users.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UserRepository for MockUserRepository {
        async fn find_user_by(
            &self,
            criteria: &UserCriteria,
        ) -> Result<Option<User>, DomainError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| criteria.matches(u)).cloned())
        }

        fn find_users(&self) -> UserStream<'_> {
            let users = self.users.lock().unwrap().clone();
            Box::pin(stream::iter(users.into_iter().map(Ok)))
        }

        fn user_class(&self) -> &'static str {
            "mock"
        }

        async fn persist(&self, user: &User) -> Result<(), DomainError> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(DomainError::persistence("Mock repository configured to fail"));
            }

            let mut users = self.users.lock().unwrap();
            users.retain(|u| u.id() != user.id());
            users.push(user.clone());
            Ok(())
        }

        async fn remove(&self, id: &UserId) -> Result<bool, DomainError> {
            let mut users = self.users.lock().unwrap();
            let before = users.len();
            users.retain(|u| u.id() != Some(id));
            Ok(users.len() < before)
        }

        fn canonicalizer(&self) -> &dyn Canonicalizer {
            &self.canonicalizer
        }

        fn password_hasher(&self) -> &dyn PasswordHasher {
            &self.hasher
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use futures::TryStreamExt;

        async fn save(repo: &MockUserRepository, username: &str, email: &str) -> User {
            let mut user = repo.create_user();
            user.set_username(username);
            user.set_email(email);
            repo.update_user(&mut user).await.unwrap();
            user
        }

        #[test]
        fn test_create_user_has_no_side_effects() {
            let repo = MockUserRepository::new();
            let user = repo.create_user();

            assert!(user.id().is_none());
            assert_eq!(repo.len(), 0);
        }

        #[tokio::test]
        async fn test_update_user_assigns_id_and_canonical_fields() {
            let repo = MockUserRepository::new();
            let user = save(&repo, "Bob", "Bob@X.com").await;

            assert!(user.id().is_some());
            assert_eq!(user.username_canonical(), "bob");
            assert_eq!(user.email_canonical(), "bob@x.com");
            assert_eq!(repo.len(), 1);
        }

        #[tokio::test]
        async fn test_update_user_keeps_id() {
            let repo = MockUserRepository::new();
            let mut user = save(&repo, "bob", "bob@x.com").await;
            let id = *user.id().unwrap();

            user.set_username("robert");
            repo.update_user(&mut user).await.unwrap();

            assert_eq!(user.id(), Some(&id));
            assert_eq!(repo.len(), 1);
            assert_eq!(user.username_canonical(), "robert");
        }

        #[tokio::test]
        async fn test_read_after_write_by_username() {
            let repo = MockUserRepository::new();
            let user = save(&repo, "alice", "alice@x.com").await;

            let found = repo.find_user_by_username("ALICE").await.unwrap().unwrap();
            assert_eq!(found.id(), user.id());
        }

        #[tokio::test]
        async fn test_find_user_by_username_or_email() {
            let repo = MockUserRepository::new();
            let user = save(&repo, "Bob", "bob@x.com").await;

            let by_name = repo.find_user_by_username_or_email("BOB").await.unwrap();
            assert_eq!(by_name.unwrap().id(), user.id());

            let by_email = repo.find_user_by_username_or_email("BOB@X.COM").await.unwrap();
            assert_eq!(by_email.unwrap().id(), user.id());

            let missing = repo.find_user_by_username_or_email("carol").await.unwrap();
            assert!(missing.is_none());
        }

        #[tokio::test]
        async fn test_find_user_by_confirmation_token() {
            let repo = MockUserRepository::new();
            let mut user = save(&repo, "bob", "bob@x.com").await;
            user.set_confirmation_token(Some("tok-123".to_string()));
            repo.update_user(&mut user).await.unwrap();

            let found = repo.find_user_by_confirmation_token("tok-123").await.unwrap();
            assert_eq!(found.unwrap().id(), user.id());

            let missing = repo.find_user_by_confirmation_token("other").await.unwrap();
            assert!(missing.is_none());
        }

        #[tokio::test]
        async fn test_update_canonical_fields_is_idempotent() {
            let repo = MockUserRepository::new();
            let mut user = repo.create_user();
            user.set_username(" MiXeD ");
            user.set_email("MiXeD@Example.org");

            repo.update_canonical_fields(&mut user);
            let once = (
                user.username_canonical().to_string(),
                user.email_canonical().to_string(),
            );

            repo.update_canonical_fields(&mut user);
            assert_eq!(user.username_canonical(), once.0);
            assert_eq!(user.email_canonical(), once.1);
        }

        #[tokio::test]
        async fn test_update_password_hashes_and_clears() {
            let repo = MockUserRepository::new();
            let mut user = repo.create_user();
            user.set_plain_password("secret-pass");

            repo.update_password(&mut user).unwrap();

            assert_eq!(user.password(), "hashed:secret-pass");
            assert!(user.plain_password().is_none());
        }

        #[tokio::test]
        async fn test_update_password_without_staged_plaintext_is_noop() {
            let repo = MockUserRepository::new();
            let mut user = repo.create_user();
            user.set_password("existing-hash");

            repo.update_password(&mut user).unwrap();
            assert_eq!(user.password(), "existing-hash");

            user.set_plain_password("");
            repo.update_password(&mut user).unwrap();
            assert_eq!(user.password(), "existing-hash");
        }

        #[tokio::test]
        async fn test_update_user_propagates_persistence_error() {
            let repo = MockUserRepository::new();
            repo.set_should_fail(true);

            let mut user = repo.create_user();
            user.set_username("bob");

            let err = repo.update_user(&mut user).await.unwrap_err();
            assert!(err.is_persistence());
            assert_eq!(repo.len(), 0);
            assert!(user.id().is_none());
            assert!(!user.is_persisted());
        }

        #[tokio::test]
        async fn test_failed_update_keeps_existing_id() {
            let repo = MockUserRepository::new();
            let mut user = save(&repo, "bob", "bob@x.com").await;
            let id = *user.id().unwrap();

            repo.set_should_fail(true);
            user.set_email("robert@x.com");

            assert!(repo.update_user(&mut user).await.is_err());
            assert_eq!(user.id(), Some(&id));
        }

        #[tokio::test]
        async fn test_delete_user_then_lookup_is_absent() {
            let repo = MockUserRepository::new();
            let user = save(&repo, "bob", "bob@x.com").await;
            let id = *user.id().unwrap();

            repo.delete_user(&user).await.unwrap();

            let found = repo.find_user_by(&UserCriteria::id(id)).await.unwrap();
            assert!(found.is_none());
        }

        #[tokio::test]
        async fn test_delete_user_twice_is_not_found() {
            let repo = MockUserRepository::new();
            let user = save(&repo, "bob", "bob@x.com").await;

            repo.delete_user(&user).await.unwrap();

            let err = repo.delete_user(&user).await.unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn test_delete_unpersisted_user_is_not_found() {
            let repo = MockUserRepository::new();
            let user = repo.create_user();

            let err = repo.delete_user(&user).await.unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn test_find_users_is_restartable() {
            let repo = MockUserRepository::new();
            save(&repo, "user1", "u1@x.com").await;
            save(&repo, "user2", "u2@x.com").await;

            let first: Vec<User> = repo.find_users().try_collect().await.unwrap();
            let second: Vec<User> = repo.find_users().try_collect().await.unwrap();

            assert_eq!(first.len(), 2);
            assert_eq!(second.len(), 2);
        }
    }
}
