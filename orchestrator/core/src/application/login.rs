// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Login Use Case
//!
//! Exchanges an email/password pair for a signed identity token.
//!
//! - **Layer:** Application
//! - **Collaborators:** `UserRepository`, `PasswordHasher`, `TokenAuthority`
//!
//! Unknown users and wrong passwords produce the same error so the endpoint
//! does not reveal which accounts exist. An unknown email is still checked
//! against a placeholder hash so both paths cost one password verification.

use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::repository::{RepositoryError, UserRepository};
use crate::domain::user::{PasswordHasher, User};
use crate::infrastructure::auth::{TokenAuthority, TokenError};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginResult {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email and password are required")]
    MissingCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("user account error: {0}")]
    Account(String),
}

pub struct LoginService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenAuthority>,
    token_ttl: Duration,
    dummy_hash: OnceLock<Option<String>>,
}

const DUMMY_PASSWORD: &str = "spec-gateway-unknown-account";

impl LoginService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenAuthority>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            token_ttl,
            dummy_hash: OnceLock::new(),
        }
    }

    fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| self.hasher.hash(DUMMY_PASSWORD).ok());
        if let Some(hash) = dummy {
            let _ = self.hasher.verify(password, hash);
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, LoginError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let Some(user) = self.users.find_by_email(email.trim()).await? else {
            self.verify_against_dummy(password);
            warn!("Login attempt for unknown user");
            return Err(LoginError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(LoginError::InvalidCredentials);
        }

        let token = self
            .tokens
            .issue(&user.id, user.token_display_name(), &user.roles, self.token_ttl)?;

        info!(user_id = %user.id, "User logged in");
        Ok(LoginResult {
            token,
            user_id: user.id,
        })
    }

    /// Create or replace the account for `email`.
    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
        roles: Vec<String>,
    ) -> Result<User, LoginError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let password_hash = self
            .hasher
            .hash(password)
            .map_err(|e| LoginError::Account(e.to_string()))?;

        // keep the id stable when an existing account is updated
        let mut user = User::new(email.trim().to_lowercase(), password_hash, roles);
        if let Some(existing) = self.users.find_by_email(&user.email).await? {
            user.id = existing.id;
            user.created_at = existing.created_at;
        }
        if let Some(name) = display_name.filter(|n| !n.is_empty()) {
            user = user.with_display_name(name);
        }

        self.users.save(&user).await?;
        info!(user_id = %user.id, "User account saved");
        Ok(user)
    }
}
