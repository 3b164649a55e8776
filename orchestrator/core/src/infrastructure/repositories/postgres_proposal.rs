// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::proposal::{GeneratedFiles, Proposal, ProposalId, ProposalStatus, ProposalTransition};
use crate::domain::repository::{ProposalRepository, RepositoryError};
use crate::domain::workflow::WorkflowId;

const PROPOSAL_COLUMNS: &str = "id, workflow_id, thread_id, instructions, context, status, \
    generated_files, failure_reason, created_by, resolved_by, created_at, completed_at, resolved_at";

pub struct PostgresProposalRepository {
    pool: PgPool,
}

impl PostgresProposalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Proposal, RepositoryError> {
        let status: String = row.try_get("status")?;
        let status: ProposalStatus = status
            .parse()
            .map_err(|e: crate::domain::proposal::ProposalError| RepositoryError::Serialization(e.to_string()))?;
        let files: serde_json::Value = row.try_get("generated_files")?;
        let generated_files: GeneratedFiles = serde_json::from_value(files)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        Ok(Proposal {
            id: ProposalId(row.try_get("id")?),
            workflow_id: WorkflowId(row.try_get("workflow_id")?),
            thread_id: row.try_get("thread_id")?,
            instructions: row.try_get("instructions")?,
            context: row.try_get("context")?,
            status,
            generated_files,
            failure_reason: row.try_get("failure_reason")?,
            created_by: row.try_get("created_by")?,
            resolved_by: row.try_get("resolved_by")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

#[async_trait]
impl ProposalRepository for PostgresProposalRepository {
    async fn insert(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        let files = serde_json::to_value(&proposal.generated_files)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO proposals (id, workflow_id, thread_id, instructions, context, status,
                                   generated_files, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(proposal.id.0)
        .bind(proposal.workflow_id.0)
        .bind(&proposal.thread_id)
        .bind(&proposal.instructions)
        .bind(&proposal.context)
        .bind(proposal.status.as_str())
        .bind(files)
        .bind(&proposal.created_by)
        .bind(proposal.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert proposal: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        let query = format!("SELECT {} FROM proposals WHERE id = $1", PROPOSAL_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<Proposal>, RepositoryError> {
        let query = format!("SELECT {} FROM proposals WHERE thread_id = $1", PROPOSAL_COLUMNS);
        let row = sqlx::query(&query)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn assign_thread_id(
        &self,
        id: ProposalId,
        thread_id: &str,
    ) -> Result<Option<Proposal>, RepositoryError> {
        let query = format!(
            "UPDATE proposals SET thread_id = $2 WHERE id = $1 AND status = $3 RETURNING {}",
            PROPOSAL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(thread_id)
            .bind(ProposalStatus::Dispatched.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to assign thread id: {}", e)))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn transition(
        &self,
        id: ProposalId,
        transition: &ProposalTransition,
    ) -> Result<Option<Proposal>, RepositoryError> {
        if !transition.from.can_transition_to(transition.to) {
            return Ok(None);
        }

        let files = transition
            .generated_files
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let completes = matches!(transition.to, ProposalStatus::Completed | ProposalStatus::Failed);
        let resolves = matches!(transition.to, ProposalStatus::Approved | ProposalStatus::Rejected);

        // Single conditional statement: the row only changes while it is
        // still in the expected source status.
        let query = format!(
            r#"
            UPDATE proposals SET
                status = $3,
                generated_files = COALESCE($4, generated_files),
                failure_reason = COALESCE($5, failure_reason),
                resolved_by = COALESCE($6, resolved_by),
                completed_at = CASE WHEN $7 THEN $9 ELSE completed_at END,
                resolved_at = CASE WHEN $8 THEN $9 ELSE resolved_at END
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            PROPOSAL_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .bind(files)
            .bind(&transition.failure_reason)
            .bind(&transition.actor)
            .bind(completes)
            .bind(resolves)
            .bind(transition.at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to transition proposal: {}", e)))?;

        row.as_ref().map(Self::from_row).transpose()
    }
}
