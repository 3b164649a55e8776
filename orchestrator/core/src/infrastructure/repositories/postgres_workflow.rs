// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, WorkflowRepository};
use crate::domain::workflow::{Workflow, WorkflowId};

pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Workflow, RepositoryError> {
        Ok(Workflow {
            id: WorkflowId(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
            specification: row.try_get("specification")?,
            owner_id: row.try_get("owner_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn insert(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, description, specification, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id.0)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.specification)
        .bind(&workflow.owner_id)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert workflow: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, specification, owner_id, created_at, updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, specification, owner_id, created_at, updated_at
            FROM workflows
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::from_row).collect()
    }
}
