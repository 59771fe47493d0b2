//! CLI module for the identity directory
//!
//! Every subcommand runs against the backend selected by `storage.backend`.

pub mod user;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::user::UserRepository;
use crate::infrastructure::logging;
use crate::infrastructure::user::{PostgresUserRepository, StorageType, UserRepositoryFactory};

/// Identity Directory - manage user accounts over pluggable storage
#[derive(Parser)]
#[command(name = "identity-directory")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the users table and indexes (PostgreSQL only)
    InitSchema,

    /// Create a user
    Create(user::CreateArgs),

    /// Find a user by username or email
    Find {
        username_or_email: String,
    },

    /// List all users
    List,

    /// Delete a user by username or email
    Delete {
        username_or_email: String,
    },

    /// Check a user's password and record the login time
    Login {
        username_or_email: String,

        #[arg(long)]
        password: String,
    },

    /// Enable a pending user through its confirmation token
    Confirm {
        token: String,
    },

    /// Check whether a username or email is still free
    CheckUnique(user::CheckUniqueArgs),
}

/// Load configuration, install logging and execute one subcommand
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging)?;

    match cli.command {
        Command::InitSchema => init_schema(&config).await,
        Command::Create(args) => print_json(&user::create(open(&config).await?, args).await?),
        Command::Find { username_or_email } => {
            print_json(&user::find(open(&config).await?, &username_or_email).await?)
        }
        Command::List => print_json(&user::list(open(&config).await?).await?),
        Command::Delete { username_or_email } => {
            print_json(&user::delete(open(&config).await?, &username_or_email).await?)
        }
        Command::Login {
            username_or_email,
            password,
        } => print_json(&user::login(open(&config).await?, &username_or_email, &password).await?),
        Command::Confirm { token } => print_json(&user::confirm(open(&config).await?, &token).await?),
        Command::CheckUnique(args) => {
            let unique = user::check_unique(open(&config).await?, &args).await?;
            print_json(&json!({
                "field": args.field,
                "value": args.value,
                "unique": unique,
            }))
        }
    }
}

async fn open(config: &AppConfig) -> anyhow::Result<Arc<dyn UserRepository>> {
    Ok(UserRepositoryFactory::create(&config.storage).await?)
}

async fn init_schema(config: &AppConfig) -> anyhow::Result<()> {
    match StorageType::from_str(&config.storage.backend) {
        Some(StorageType::Postgres) => {
            let repository = PostgresUserRepository::connect(&config.storage.postgres).await?;
            repository.ensure_schema().await?;
            info!("Users schema is up to date");
        }
        _ => warn!(
            "Backend '{}' has no schema to initialize",
            config.storage.backend
        ),
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
