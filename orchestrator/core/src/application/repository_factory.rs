// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the storage backend
//! configuration. The domain layer only knows the traits; this module picks
//! the PostgreSQL or in-memory adapters.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire repository adapters for the configured backend

use anyhow::{Context, Result};
use std::sync::Arc;
use sqlx::PgPool;

use crate::domain::repository::{ProposalRepository, StorageBackend, UserRepository, WorkflowRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryProposalRepository, InMemoryUserRepository, InMemoryWorkflowRepository, PostgresProposalRepository,
    PostgresUserRepository, PostgresWorkflowRepository,
};

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
            proposals: Arc::new(InMemoryProposalRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PostgresUserRepository::new(pool.clone())),
            workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            proposals: Arc::new(PostgresProposalRepository::new(pool)),
        }
    }
}

/// Connect to the configured backend. PostgreSQL connections are migrated
/// before the repositories are handed out.
pub async fn create_repositories(backend: &StorageBackend) -> Result<Repositories> {
    match backend {
        StorageBackend::InMemory => {
            tracing::warn!("No database configured; using in-memory repositories (state is lost on restart)");
            Ok(Repositories::in_memory())
        }
        StorageBackend::PostgreSQL(config) => {
            let database = Database::new(config)
                .await
                .context("Failed to connect to PostgreSQL")?;
            database.migrate().await.context("Failed to run database migrations")?;
            tracing::info!("Using PostgreSQL repositories");
            Ok(Repositories::postgres(database.get_pool().clone()))
        }
    }
}
