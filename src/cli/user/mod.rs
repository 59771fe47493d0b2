//! User subcommands

use std::sync::Arc;

use anyhow::{anyhow, bail};
use clap::Args;
use futures::TryStreamExt;
use tracing::info;

use crate::domain::user::{
    validate_email, validate_password, validate_username, UniqueConstraint, UniqueField,
    UniqueValidator, UniquenessChecker, User, UserId, UserRepository,
};
use crate::infrastructure::user::TokenGenerator;

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,

    /// Create the user disabled, with a confirmation token to enable it later
    #[arg(long)]
    pub unconfirmed: bool,
}

#[derive(Debug, Args)]
pub struct CheckUniqueArgs {
    /// `username` or `email`
    #[arg(long, default_value = "username")]
    pub field: String,

    /// Id of the user being edited
    #[arg(long)]
    pub exclude: Option<String>,

    pub value: String,
}

pub async fn create(repository: Arc<dyn UserRepository>, args: CreateArgs) -> anyhow::Result<User> {
    validate_username(&args.username)?;
    validate_email(&args.email)?;
    validate_password(&args.password)?;

    let validator = UniqueValidator::new(Arc::new(UniquenessChecker::new(Arc::clone(&repository))));

    for (field, value) in [
        (UniqueField::Username, &args.username),
        (UniqueField::Email, &args.email),
    ] {
        let constraint = UniqueConstraint::new(field);
        if !validator.is_valid(value, &constraint).await? {
            bail!("{}", constraint.message);
        }
    }

    let mut user = repository.create_user();
    user.set_username(args.username);
    user.set_email(args.email);
    user.set_plain_password(args.password);

    if args.unconfirmed {
        user.set_enabled(false);
        user.set_confirmation_token(Some(TokenGenerator::new().generate()));
    }

    repository.update_user(&mut user).await?;
    Ok(user)
}

pub async fn find(
    repository: Arc<dyn UserRepository>,
    username_or_email: &str,
) -> anyhow::Result<User> {
    repository
        .find_user_by_username_or_email(username_or_email)
        .await?
        .ok_or_else(|| anyhow!("No user matches '{}'", username_or_email))
}

pub async fn list(repository: Arc<dyn UserRepository>) -> anyhow::Result<Vec<User>> {
    let users: Vec<User> = repository.find_users().try_collect().await?;
    Ok(users)
}

pub async fn delete(
    repository: Arc<dyn UserRepository>,
    username_or_email: &str,
) -> anyhow::Result<User> {
    let user = find(Arc::clone(&repository), username_or_email).await?;
    repository.delete_user(&user).await?;
    Ok(user)
}

/// Enable the user holding `token` and clear the token
pub async fn confirm(repository: Arc<dyn UserRepository>, token: &str) -> anyhow::Result<User> {
    let mut user = repository
        .find_user_by_confirmation_token(token)
        .await?
        .ok_or_else(|| anyhow!("Unknown confirmation token"))?;

    user.set_confirmation_token(None);
    user.set_enabled(true);
    repository.update_user(&mut user).await?;

    info!(username = user.username(), "User confirmed");
    Ok(user)
}

/// Verify the password of an enabled user and record the login time
pub async fn login(
    repository: Arc<dyn UserRepository>,
    username_or_email: &str,
    password: &str,
) -> anyhow::Result<User> {
    let mut user = find(Arc::clone(&repository), username_or_email).await?;

    if !user.is_enabled() || !repository.password_hasher().verify(password, user.password()) {
        bail!("Invalid credentials");
    }

    user.record_login();
    repository.update_user(&mut user).await?;

    info!(username = user.username(), "User logged in");
    Ok(user)
}

pub async fn check_unique(
    repository: Arc<dyn UserRepository>,
    args: &CheckUniqueArgs,
) -> anyhow::Result<bool> {
    let field: UniqueField = args.field.parse()?;
    let exclude = args
        .exclude
        .as_deref()
        .map(str::parse::<UserId>)
        .transpose()?;

    let checker = UniquenessChecker::new(repository);
    Ok(checker
        .validate_unique(&args.value, field, exclude.as_ref())
        .await?)
}
