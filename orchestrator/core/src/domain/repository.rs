// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `UserRepository` | `User` | `InMemoryUserRepository`, `PostgresUserRepository` |
//! | `WorkflowRepository` | `Workflow` | `InMemoryWorkflowRepository`, `PostgresWorkflowRepository` |
//! | `ProposalRepository` | `Proposal` | `InMemoryProposalRepository`, `PostgresProposalRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup: a configured
//! `database.url` selects PostgreSQL, otherwise the in-memory repositories
//! are used (development and tests).
//!
//! ## Concurrency
//!
//! The store is the single source of truth shared by every gateway
//! instance. Proposal status changes go through
//! [`ProposalRepository::transition`], a compare-and-set on the current
//! status; no in-process lock is relied on for correctness.

use async_trait::async_trait;

use crate::domain::proposal::{Proposal, ProposalId, ProposalTransition};
use crate::domain::user::User;
use crate::domain::workflow::{Workflow, WorkflowId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: &User) -> Result<(), RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    /// Workflows owned by `owner_id`, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn insert(&self, proposal: &Proposal) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError>;

    async fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<Proposal>, RepositoryError>;

    /// Rebind a `Dispatched` proposal to the thread id the engine assigned.
    ///
    /// Returns `None` when the proposal is missing or no longer dispatched.
    async fn assign_thread_id(
        &self,
        id: ProposalId,
        thread_id: &str,
    ) -> Result<Option<Proposal>, RepositoryError>;

    /// Apply `transition` only if the stored status equals `transition.from`.
    ///
    /// Returns the updated proposal when the transition won, `None` when the
    /// proposal is missing or was no longer in the expected status.
    async fn transition(
        &self,
        id: ProposalId,
        transition: &ProposalTransition,
    ) -> Result<Option<Proposal>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}
