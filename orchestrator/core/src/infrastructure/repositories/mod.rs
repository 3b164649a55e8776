// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresUserRepository** - login accounts
//! - **PostgresWorkflowRepository** - workflow specifications
//! - **PostgresProposalRepository** - refinement proposals; status changes are
//!   conditional `UPDATE ... WHERE status = $expected` statements
//!
//! ## In-Memory Repositories
//!
//! HashMap-backed implementations for development and tests. The proposal
//! transition runs under the write lock so it has the same compare-and-set
//! semantics as the SQL path.

pub mod postgres_proposal;
pub mod postgres_user;
pub mod postgres_workflow;

pub use postgres_proposal::PostgresProposalRepository;
pub use postgres_user::PostgresUserRepository;
pub use postgres_workflow::PostgresWorkflowRepository;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::proposal::{Proposal, ProposalId, ProposalStatus, ProposalTransition};
use crate::domain::repository::{
    ProposalRepository, RepositoryError, UserRepository, WorkflowRepository,
};
use crate::domain::user::User;
use crate::domain::workflow::{Workflow, WorkflowId};

fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unknown("repository lock poisoned".to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(poisoned)?;
        users.insert(user.email.to_lowercase(), user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(&email.to_lowercase()).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().map_err(poisoned)?;
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().map_err(poisoned)?;
        Ok(workflows.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().map_err(poisoned)?;
        let mut owned: Vec<Workflow> = workflows
            .values()
            .filter(|w| w.is_owned_by(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProposalRepository {
    proposals: Arc<RwLock<HashMap<ProposalId, Proposal>>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn insert(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write().map_err(poisoned)?;
        proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        let proposals = self.proposals.read().map_err(poisoned)?;
        Ok(proposals.get(&id).cloned())
    }

    async fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<Proposal>, RepositoryError> {
        let proposals = self.proposals.read().map_err(poisoned)?;
        Ok(proposals.values().find(|p| p.thread_id == thread_id).cloned())
    }

    async fn assign_thread_id(
        &self,
        id: ProposalId,
        thread_id: &str,
    ) -> Result<Option<Proposal>, RepositoryError> {
        let mut proposals = self.proposals.write().map_err(poisoned)?;
        if proposals.values().any(|p| p.id != id && p.thread_id == thread_id) {
            return Err(RepositoryError::Database(format!(
                "thread id {} already belongs to another proposal",
                thread_id
            )));
        }
        match proposals.get_mut(&id) {
            Some(proposal) if proposal.status == ProposalStatus::Dispatched => {
                proposal.thread_id = thread_id.to_string();
                Ok(Some(proposal.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition(
        &self,
        id: ProposalId,
        transition: &ProposalTransition,
    ) -> Result<Option<Proposal>, RepositoryError> {
        let mut proposals = self.proposals.write().map_err(poisoned)?;
        let Some(proposal) = proposals.get_mut(&id) else {
            return Ok(None);
        };
        if proposal.status != transition.from {
            return Ok(None);
        }
        let mut next = proposal.clone();
        if next.apply(transition).is_err() {
            return Ok(None);
        }
        *proposal = next.clone();
        Ok(Some(next))
    }
}
