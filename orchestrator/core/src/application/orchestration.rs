// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestration Service
//!
//! Workflow and refinement proposal use cases, all performed on behalf of a
//! verified [`Caller`].
//!
//! - **Layer:** Application
//! - **Collaborators:** `WorkflowRepository`, `ProposalRepository`,
//!   `RefinementDispatcher`, `EventBus`
//!
//! # Access control
//!
//! Every read or mutation compares the resource owner with
//! `caller.subject_id`. A malformed or unknown id is `NotFound`; an existing
//! resource owned by someone else is always `Forbidden`.
//!
//! # Proposal transitions
//!
//! Status changes go through `ProposalRepository::transition`, which only
//! applies when the stored status still matches. When approve and reject
//! race, exactly one wins and the other gets `Conflict` with the winner's
//! status.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::refinement_dispatch::RefinementDispatcher;
use crate::domain::events::{ProposalEvent, WorkflowEvent};
use crate::domain::identity::Caller;
use crate::domain::proposal::{Proposal, ProposalError, ProposalId, ProposalStatus, ProposalTransition};
use crate::domain::repository::{ProposalRepository, RepositoryError, WorkflowRepository};
use crate::domain::workflow::{Workflow, WorkflowError, WorkflowId};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("access to this {0} is forbidden")]
    Forbidden(String),

    #[error("proposal is {status}, expected completed")]
    Conflict { status: ProposalStatus },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<WorkflowError> for OrchestrationError {
    fn from(e: WorkflowError) -> Self {
        OrchestrationError::Validation(e.to_string())
    }
}

impl From<ProposalError> for OrchestrationError {
    fn from(e: ProposalError) -> Self {
        match e {
            ProposalError::InvalidTransition { from, .. } => OrchestrationError::Conflict { status: from },
            other => OrchestrationError::Validation(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub specification: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateRefinementRequest {
    pub instructions: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Approve,
    Reject,
}

impl Resolution {
    fn transition(self, actor: &str) -> ProposalTransition {
        match self {
            Resolution::Approve => ProposalTransition::approve(actor),
            Resolution::Reject => ProposalTransition::reject(actor),
        }
    }
}

pub struct OrchestrationService {
    workflows: Arc<dyn WorkflowRepository>,
    proposals: Arc<dyn ProposalRepository>,
    dispatcher: RefinementDispatcher,
    event_bus: Arc<EventBus>,
}

impl OrchestrationService {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        proposals: Arc<dyn ProposalRepository>,
        dispatcher: RefinementDispatcher,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            workflows,
            proposals,
            dispatcher,
            event_bus,
        }
    }

    pub async fn create_workflow(
        &self,
        caller: &Caller,
        request: CreateWorkflowRequest,
    ) -> Result<Workflow, OrchestrationError> {
        let workflow = Workflow::new(
            caller.subject_id.clone(),
            request.name.unwrap_or_default(),
            request.description.unwrap_or_default(),
            request
                .specification
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        )?;

        self.workflows.insert(&workflow).await?;

        info!(workflow_id = %workflow.id, owner_id = %workflow.owner_id, "Workflow created");
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowCreated {
            workflow_id: workflow.id,
            owner_id: workflow.owner_id.clone(),
            name: workflow.name.clone(),
            created_at: workflow.created_at,
        });

        Ok(workflow)
    }

    pub async fn list_workflows(&self, caller: &Caller) -> Result<Vec<Workflow>, OrchestrationError> {
        Ok(self.workflows.list_by_owner(&caller.subject_id).await?)
    }

    pub async fn get_workflow(&self, caller: &Caller, workflow_id: &str) -> Result<Workflow, OrchestrationError> {
        let id = WorkflowId::parse(workflow_id).ok_or_else(|| OrchestrationError::NotFound("workflow".into()))?;
        let workflow = self
            .workflows
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound("workflow".into()))?;

        if !caller.owns(&workflow.owner_id) {
            warn!(workflow_id = %id, subject_id = %caller.subject_id, "Workflow access denied");
            return Err(OrchestrationError::Forbidden("workflow".into()));
        }
        Ok(workflow)
    }

    /// Persist a new proposal, mark it dispatched and hand it to the
    /// background dispatcher. Returns without waiting for the engine.
    pub async fn create_refinement(
        &self,
        caller: &Caller,
        workflow_id: &str,
        request: CreateRefinementRequest,
    ) -> Result<Proposal, OrchestrationError> {
        // input is validated before the workflow is looked up
        let instructions = request.instructions.unwrap_or_default();
        if instructions.trim().is_empty() {
            return Err(ProposalError::MissingInstructions.into());
        }

        let workflow = self.get_workflow(caller, workflow_id).await?;
        let proposal = Proposal::new(workflow.id, caller.subject_id.clone(), instructions, request.context)?;

        self.proposals.insert(&proposal).await?;
        self.event_bus.publish_proposal_event(ProposalEvent::ProposalCreated {
            proposal_id: proposal.id,
            workflow_id: workflow.id,
            thread_id: proposal.thread_id.clone(),
            created_by: proposal.created_by.clone(),
            created_at: proposal.created_at,
        });

        let dispatched = self
            .proposals
            .transition(proposal.id, &ProposalTransition::dispatch())
            .await?
            .ok_or_else(|| RepositoryError::Unknown(format!("proposal {} vanished before dispatch", proposal.id)))?;

        metrics::counter!("gateway_proposals_dispatched_total").increment(1);
        info!(proposal_id = %dispatched.id, workflow_id = %workflow.id, thread_id = %dispatched.thread_id, "Refinement dispatched");
        self.event_bus.publish_proposal_event(ProposalEvent::ProposalDispatched {
            proposal_id: dispatched.id,
            thread_id: dispatched.thread_id.clone(),
            dispatched_at: Utc::now(),
        });

        self.dispatcher.spawn(dispatched.clone(), workflow.specification);

        Ok(dispatched)
    }

    pub async fn get_proposal(&self, caller: &Caller, proposal_id: &str) -> Result<Proposal, OrchestrationError> {
        let id = ProposalId::parse(proposal_id).ok_or_else(|| OrchestrationError::NotFound("proposal".into()))?;
        let proposal = self
            .proposals
            .find_by_id(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound("proposal".into()))?;

        if !proposal.is_owned_by(&caller.subject_id) {
            warn!(proposal_id = %id, subject_id = %caller.subject_id, "Proposal access denied");
            return Err(OrchestrationError::Forbidden("proposal".into()));
        }
        Ok(proposal)
    }

    pub async fn approve_proposal(&self, caller: &Caller, proposal_id: &str) -> Result<Proposal, OrchestrationError> {
        self.resolve(caller, proposal_id, Resolution::Approve).await
    }

    pub async fn reject_proposal(&self, caller: &Caller, proposal_id: &str) -> Result<Proposal, OrchestrationError> {
        self.resolve(caller, proposal_id, Resolution::Reject).await
    }

    async fn resolve(
        &self,
        caller: &Caller,
        proposal_id: &str,
        resolution: Resolution,
    ) -> Result<Proposal, OrchestrationError> {
        let proposal = self.get_proposal(caller, proposal_id).await?;
        if proposal.status != ProposalStatus::Completed {
            return Err(OrchestrationError::Conflict { status: proposal.status });
        }

        let transition = resolution.transition(&caller.subject_id);
        let Some(resolved) = self.proposals.transition(proposal.id, &transition).await? else {
            // lost the race; report what the winner left behind
            let current = self
                .proposals
                .find_by_id(proposal.id)
                .await?
                .map(|p| p.status)
                .unwrap_or(proposal.status);
            return Err(OrchestrationError::Conflict { status: current });
        };

        info!(proposal_id = %resolved.id, status = %resolved.status, resolved_by = %caller.subject_id, "Proposal resolved");
        self.event_bus.publish_proposal_event(ProposalEvent::ProposalResolved {
            proposal_id: resolved.id,
            resolution: resolved.status,
            resolved_by: caller.subject_id.clone(),
            resolved_at: resolved.resolved_at.unwrap_or_else(Utc::now),
        });

        Ok(resolved)
    }

    /// A stream for a thread the gateway dispatched is only visible to the
    /// proposal's creator. Threads the gateway has no record of are left to
    /// the engine.
    pub async fn authorize_stream(&self, caller: &Caller, thread_id: &str) -> Result<(), OrchestrationError> {
        match self.proposals.find_by_thread_id(thread_id).await? {
            Some(proposal) if !proposal.is_owned_by(&caller.subject_id) => {
                warn!(thread_id, subject_id = %caller.subject_id, "Stream access denied");
                Err(OrchestrationError::Forbidden("thread".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::refinement_dispatch::DispatchSettings;
    use crate::domain::proposal::GeneratedFiles;
    use crate::domain::spec_engine::{
        EngineError, EngineEventStream, EngineRunStatus, InvokeRequest, InvokeResponse, SpecEngine, ThreadState,
    };
    use crate::infrastructure::repositories::{InMemoryProposalRepository, InMemoryWorkflowRepository};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct CompletingEngine;

    #[async_trait]
    impl SpecEngine for CompletingEngine {
        async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, EngineError> {
            Ok(InvokeResponse {
                thread_id: request.thread_id.clone(),
                status: "started".into(),
            })
        }

        async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, EngineError> {
            let mut files = GeneratedFiles::new();
            files.insert("/agent.py".into(), json!({"content": ["pass"]}));
            Ok(ThreadState {
                thread_id: thread_id.to_string(),
                status: EngineRunStatus::Completed,
                result: None,
                generated_files: files,
                error: None,
            })
        }

        async fn open_event_stream(&self, _thread_id: &str) -> Result<EngineEventStream, EngineError> {
            Err(EngineError::Unavailable("unused".into()))
        }
    }

    fn caller(id: &str) -> Caller {
        Caller {
            subject_id: id.to_string(),
            display_name: format!("{id}@example.com"),
            roles: vec!["user".into()],
        }
    }

    fn service() -> (OrchestrationService, InMemoryProposalRepository) {
        let proposals = InMemoryProposalRepository::new();
        let event_bus = Arc::new(EventBus::new(64));
        let dispatcher = RefinementDispatcher::new(
            Arc::new(CompletingEngine),
            Arc::new(proposals.clone()),
            event_bus.clone(),
            DispatchSettings {
                poll_interval: Duration::from_millis(5),
                completion_timeout: Duration::from_secs(5),
            },
        );
        let service = OrchestrationService::new(
            Arc::new(InMemoryWorkflowRepository::new()),
            Arc::new(proposals.clone()),
            dispatcher,
            event_bus,
        );
        (service, proposals)
    }

    async fn workflow(service: &OrchestrationService, owner: &Caller) -> Workflow {
        service
            .create_workflow(
                owner,
                CreateWorkflowRequest {
                    name: Some("Support bot".into()),
                    description: Some("answers tickets".into()),
                    specification: Some(json!({"nodes": ["triage"]})),
                },
            )
            .await
            .unwrap()
    }

    async fn wait_for_status(repo: &InMemoryProposalRepository, id: ProposalId, status: ProposalStatus) -> Proposal {
        for _ in 0..200 {
            let p = repo.find_by_id(id).await.unwrap().unwrap();
            if p.status == status {
                return p;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("proposal never reached {status}");
    }

    fn refinement(instructions: &str) -> CreateRefinementRequest {
        CreateRefinementRequest {
            instructions: Some(instructions.into()),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_workflow_ownership() {
        let (service, _) = service();
        let alice = caller("alice");
        let wf = workflow(&service, &alice).await;

        assert_eq!(service.get_workflow(&alice, &wf.id.to_string()).await.unwrap().id, wf.id);
        assert!(matches!(
            service.get_workflow(&caller("bob"), &wf.id.to_string()).await,
            Err(OrchestrationError::Forbidden(_))
        ));
        assert!(matches!(
            service.get_workflow(&alice, &WorkflowId::new().to_string()).await,
            Err(OrchestrationError::NotFound(_))
        ));
        assert!(matches!(
            service.get_workflow(&alice, "not-a-uuid").await,
            Err(OrchestrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_name_is_validation_error() {
        let (service, _) = service();
        assert!(matches!(
            service.create_workflow(&caller("alice"), CreateWorkflowRequest::default()).await,
            Err(OrchestrationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_runs_before_workflow_lookup() {
        let (service, _) = service();
        let alice = caller("alice");
        let unknown = WorkflowId::new().to_string();

        assert!(matches!(
            service.create_refinement(&alice, &unknown, refinement("")).await,
            Err(OrchestrationError::Validation(_))
        ));
        assert!(matches!(
            service.create_refinement(&alice, &unknown, refinement("add tests")).await,
            Err(OrchestrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refinement_dispatches_and_completes() {
        let (service, repo) = service();
        let alice = caller("alice");
        let wf = workflow(&service, &alice).await;

        let proposal = service
            .create_refinement(&alice, &wf.id.to_string(), refinement("add tests"))
            .await
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Dispatched);
        assert!(!proposal.thread_id.is_empty());

        let done = wait_for_status(&repo, proposal.id, ProposalStatus::Completed).await;
        assert!(done.generated_files.contains_key("/agent.py"));
    }

    #[tokio::test]
    async fn test_other_user_cannot_refine() {
        let (service, _) = service();
        let wf = workflow(&service, &caller("alice")).await;
        assert!(matches!(
            service
                .create_refinement(&caller("bob"), &wf.id.to_string(), refinement("steal"))
                .await,
            Err(OrchestrationError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_rules() {
        let (service, repo) = service();
        let alice = caller("alice");
        let wf = workflow(&service, &alice).await;
        let proposal = service
            .create_refinement(&alice, &wf.id.to_string(), refinement("add tests"))
            .await
            .unwrap();
        let id = proposal.id.to_string();

        assert!(matches!(
            service.approve_proposal(&alice, &ProposalId::new().to_string()).await,
            Err(OrchestrationError::NotFound(_))
        ));

        wait_for_status(&repo, proposal.id, ProposalStatus::Completed).await;

        assert!(matches!(
            service.approve_proposal(&caller("bob"), &id).await,
            Err(OrchestrationError::Forbidden(_))
        ));

        let approved = service.approve_proposal(&alice, &id).await.unwrap();
        assert_eq!(approved.status, ProposalStatus::Approved);
        assert_eq!(approved.resolved_by.as_deref(), Some("alice"));

        assert!(matches!(
            service.reject_proposal(&alice, &id).await,
            Err(OrchestrationError::Conflict {
                status: ProposalStatus::Approved
            })
        ));
    }

    #[tokio::test]
    async fn test_stream_authorization() {
        let (service, _) = service();
        let alice = caller("alice");
        let wf = workflow(&service, &alice).await;
        let proposal = service
            .create_refinement(&alice, &wf.id.to_string(), refinement("add tests"))
            .await
            .unwrap();

        assert!(service.authorize_stream(&alice, &proposal.thread_id).await.is_ok());
        assert!(matches!(
            service.authorize_stream(&caller("bob"), &proposal.thread_id).await,
            Err(OrchestrationError::Forbidden(_))
        ));
        assert!(service.authorize_stream(&caller("bob"), "engine-only-thread").await.is_ok());
    }
}
