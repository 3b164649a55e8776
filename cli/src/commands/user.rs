// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Account management commands
//!
//! Accounts are written straight to the configured store. With no database
//! configured the in-memory store is used and the account only lives for
//! the duration of the command, which is reported as a warning.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::sync::Arc;

use gateway_core::application::{create_repositories, LoginService};
use gateway_core::domain::gateway_config::GatewayConfigManifest;
use gateway_core::domain::repository::StorageBackend;
use gateway_core::infrastructure::auth::{Argon2PasswordHasher, TokenAuthority};

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a login account, or reset the password of an existing one
    Add {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SPEC_GATEWAY_USER_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        display_name: Option<String>,

        /// Role to grant (repeatable)
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<String>,
    },
}

pub async fn handle_command(command: UserCommand, config: GatewayConfigManifest) -> Result<()> {
    match command {
        UserCommand::Add {
            email,
            password,
            display_name,
            roles,
        } => add(config, email, password, display_name, roles).await,
    }
}

async fn add(
    config: GatewayConfigManifest,
    email: String,
    password: String,
    display_name: Option<String>,
    roles: Vec<String>,
) -> Result<()> {
    let backend = config.storage_backend();
    if matches!(backend, StorageBackend::InMemory) {
        eprintln!(
            "{}",
            "Warning: no database configured; the account will not outlive this command".yellow()
        );
    }

    let repositories = create_repositories(&backend)
        .await
        .context("Failed to initialize repositories")?;

    let secret = config.signing_secret();
    let login = LoginService::new(
        repositories.users,
        Arc::new(Argon2PasswordHasher::new()),
        Arc::new(TokenAuthority::new(secret.as_deref())),
        config.spec.auth.token_ttl,
    );

    let roles = if roles.is_empty() {
        vec!["user".to_string()]
    } else {
        roles
    };

    let user = login
        .register_user(&email, &password, display_name, roles)
        .await
        .context("Failed to save account")?;

    println!("{}", "✓ Account saved".green());
    println!("  User ID: {}", user.id);
    println!("  Email:   {}", user.email);
    println!("  Roles:   {}", user.roles.join(", "));

    Ok(())
}
