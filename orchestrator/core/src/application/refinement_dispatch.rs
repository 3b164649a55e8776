// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Refinement Dispatch
//!
//! Background half of `create_refinement`. Each dispatched proposal gets its
//! own tokio task that:
//!
//! 1. calls `SpecEngine::invoke` with the workflow specification and the
//!    refinement payload,
//! 2. polls `SpecEngine::fetch_state` until the engine reports a terminal
//!    status or the completion deadline passes,
//! 3. writes `COMPLETED` (with the generated files) or `FAILED` back through
//!    the proposal store as a conditional update from `DISPATCHED`.
//!
//! Failures are recorded on the proposal and never retried. In-flight
//! invocations are not cancelled.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::events::ProposalEvent;
use crate::domain::proposal::{GeneratedFiles, Proposal, ProposalTransition};
use crate::domain::repository::ProposalRepository;
use crate::domain::spec_engine::{EngineError, EngineRunStatus, InvokeRequest, RefinementPayload, SpecEngine};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub completion_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            completion_timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone)]
pub struct RefinementDispatcher {
    engine: Arc<dyn SpecEngine>,
    proposals: Arc<dyn ProposalRepository>,
    event_bus: Arc<EventBus>,
    settings: DispatchSettings,
}

impl RefinementDispatcher {
    pub fn new(
        engine: Arc<dyn SpecEngine>,
        proposals: Arc<dyn ProposalRepository>,
        event_bus: Arc<EventBus>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            engine,
            proposals,
            event_bus,
            settings,
        }
    }

    /// Fire and forget. The handle is returned for callers that want to
    /// await completion (tests, shutdown).
    pub fn spawn(&self, proposal: Proposal, agent_definition: serde_json::Value) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(proposal, agent_definition).await })
    }

    async fn run(&self, proposal: Proposal, agent_definition: serde_json::Value) {
        let request = InvokeRequest {
            job_id: proposal.id.to_string(),
            trace_id: Uuid::new_v4().to_string(),
            thread_id: proposal.thread_id.clone(),
            agent_definition,
            input_payload: RefinementPayload {
                instructions: proposal.instructions.clone(),
                context: proposal.context.clone(),
            },
        };

        let outcome = match self.engine.invoke(&request).await {
            Ok(response) => {
                info!(proposal_id = %proposal.id, thread_id = %response.thread_id, status = %response.status, "Refinement dispatched to spec engine");
                let thread_id = if response.thread_id.is_empty() {
                    proposal.thread_id.clone()
                } else {
                    response.thread_id
                };
                match self.bind_engine_thread(&proposal, &thread_id).await {
                    Ok(()) => self.await_completion(&thread_id).await,
                    Err(reason) => Err(reason),
                }
            }
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(files) => self.record_completed(&proposal, files).await,
            Err(reason) => self.record_failed(&proposal, reason).await,
        }
    }

    /// Point the stored proposal at the thread the engine actually runs, so
    /// state lookups and stream authorization use the engine's id.
    async fn bind_engine_thread(&self, proposal: &Proposal, thread_id: &str) -> Result<(), String> {
        if thread_id == proposal.thread_id {
            return Ok(());
        }
        match self.proposals.assign_thread_id(proposal.id, thread_id).await {
            Ok(Some(_)) => {
                debug!(proposal_id = %proposal.id, from = %proposal.thread_id, to = thread_id, "Proposal rebound to engine thread");
                Ok(())
            }
            // left DISPATCHED; the final conditional write will be a no-op
            Ok(None) => Ok(()),
            Err(e) => Err(format!("could not record engine thread id: {}", e)),
        }
    }

    async fn await_completion(&self, thread_id: &str) -> Result<GeneratedFiles, String> {
        let poll = async {
            loop {
                match self.engine.fetch_state(thread_id).await {
                    Ok(state) => match state.status {
                        EngineRunStatus::Completed => return Ok(state.generated_files),
                        EngineRunStatus::Failed => {
                            return Err(state
                                .error
                                .unwrap_or_else(|| "spec engine reported failure".to_string()))
                        }
                        EngineRunStatus::InProgress => {}
                    },
                    // the engine may not have registered the thread yet
                    Err(EngineError::NotFound(_)) => {
                        debug!(thread_id, "Thread not yet known to spec engine");
                    }
                    Err(e) => return Err(e.to_string()),
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        tokio::time::timeout(self.settings.completion_timeout, poll)
            .await
            .unwrap_or_else(|_| {
                Err(format!(
                    "spec engine did not finish within {:?}",
                    self.settings.completion_timeout
                ))
            })
    }

    async fn record_completed(&self, proposal: &Proposal, files: GeneratedFiles) {
        let file_count = files.len();
        match self
            .proposals
            .transition(proposal.id, &ProposalTransition::complete(files))
            .await
        {
            Ok(Some(_)) => {
                metrics::counter!("gateway_proposals_completed_total").increment(1);
                info!(proposal_id = %proposal.id, file_count, "Refinement completed");
                self.event_bus.publish_proposal_event(ProposalEvent::ProposalCompleted {
                    proposal_id: proposal.id,
                    file_count,
                    completed_at: Utc::now(),
                });
            }
            Ok(None) => warn!(proposal_id = %proposal.id, "Proposal left DISPATCHED before completion was recorded"),
            Err(e) => error!(proposal_id = %proposal.id, error = %e, "Failed to persist refinement result"),
        }
    }

    async fn record_failed(&self, proposal: &Proposal, reason: String) {
        warn!(proposal_id = %proposal.id, reason = %reason, "Refinement failed");
        match self
            .proposals
            .transition(proposal.id, &ProposalTransition::fail(reason.clone()))
            .await
        {
            Ok(Some(_)) => {
                metrics::counter!("gateway_proposals_failed_total").increment(1);
                self.event_bus.publish_proposal_event(ProposalEvent::ProposalFailed {
                    proposal_id: proposal.id,
                    reason,
                    failed_at: Utc::now(),
                });
            }
            Ok(None) => warn!(proposal_id = %proposal.id, "Proposal left DISPATCHED before failure was recorded"),
            Err(e) => error!(proposal_id = %proposal.id, error = %e, "Failed to persist refinement failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proposal::ProposalStatus;
    use crate::domain::spec_engine::{EngineEventStream, InvokeResponse, ThreadState};
    use crate::domain::workflow::WorkflowId;
    use crate::infrastructure::repositories::InMemoryProposalRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports `InProgress` for the first `pending_polls` state reads.
    struct ScriptedEngine {
        invoke_error: Option<EngineError>,
        assigned_thread_id: Option<String>,
        final_state: ThreadState,
        pending_polls: usize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl SpecEngine for ScriptedEngine {
        async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, EngineError> {
            match &self.invoke_error {
                Some(e) => Err(e.clone()),
                None => Ok(InvokeResponse {
                    thread_id: self
                        .assigned_thread_id
                        .clone()
                        .unwrap_or_else(|| request.thread_id.clone()),
                    status: "started".to_string(),
                }),
            }
        }

        async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, EngineError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n < self.pending_polls {
                return Ok(ThreadState {
                    thread_id: thread_id.to_string(),
                    status: EngineRunStatus::InProgress,
                    result: None,
                    generated_files: GeneratedFiles::new(),
                    error: None,
                });
            }
            Ok(self.final_state.clone())
        }

        async fn open_event_stream(&self, _thread_id: &str) -> Result<EngineEventStream, EngineError> {
            Err(EngineError::Unavailable("not scripted".to_string()))
        }
    }

    fn state(status: EngineRunStatus, files: GeneratedFiles, error: Option<&str>) -> ThreadState {
        ThreadState {
            thread_id: String::new(),
            status,
            result: None,
            generated_files: files,
            error: error.map(str::to_string),
        }
    }

    async fn dispatched(repo: &InMemoryProposalRepository) -> Proposal {
        let proposal = Proposal::new(WorkflowId::new(), "user-a", "Add logging", None).unwrap();
        repo.insert(&proposal).await.unwrap();
        repo.transition(proposal.id, &ProposalTransition::dispatch())
            .await
            .unwrap()
            .unwrap()
    }

    fn dispatcher(engine: ScriptedEngine, repo: InMemoryProposalRepository, timeout: Duration) -> RefinementDispatcher {
        RefinementDispatcher::new(
            Arc::new(engine),
            Arc::new(repo),
            Arc::new(EventBus::new(16)),
            DispatchSettings {
                poll_interval: Duration::from_millis(5),
                completion_timeout: timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_completed_run_persists_files() {
        let repo = InMemoryProposalRepository::new();
        let proposal = dispatched(&repo).await;

        let mut files = GeneratedFiles::new();
        files.insert("/definition.json".into(), json!({"content": ["{}"]}));
        files.insert("/tools.py".into(), json!({"content": ["def tool(): ..."]}));

        let engine = ScriptedEngine {
            invoke_error: None,
            assigned_thread_id: None,
            final_state: state(EngineRunStatus::Completed, files.clone(), None),
            pending_polls: 2,
            polls: AtomicUsize::new(0),
        };

        dispatcher(engine, repo.clone(), Duration::from_secs(5))
            .spawn(proposal.clone(), json!({}))
            .await
            .unwrap();

        let stored = repo.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Completed);
        assert_eq!(stored.generated_files, files);
    }

    #[tokio::test]
    async fn test_invoke_failure_marks_failed() {
        let repo = InMemoryProposalRepository::new();
        let proposal = dispatched(&repo).await;

        let engine = ScriptedEngine {
            invoke_error: Some(EngineError::Unavailable("connection refused".to_string())),
            assigned_thread_id: None,
            final_state: state(EngineRunStatus::Completed, GeneratedFiles::new(), None),
            pending_polls: 0,
            polls: AtomicUsize::new(0),
        };

        dispatcher(engine, repo.clone(), Duration::from_secs(5))
            .spawn(proposal.clone(), json!({}))
            .await
            .unwrap();

        let stored = repo.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Failed);
        assert!(stored.generated_files.is_empty());
        assert!(stored.failure_reason.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_engine_reported_error_marks_failed() {
        let repo = InMemoryProposalRepository::new();
        let proposal = dispatched(&repo).await;

        let engine = ScriptedEngine {
            invoke_error: None,
            assigned_thread_id: None,
            final_state: state(EngineRunStatus::Failed, GeneratedFiles::new(), Some("model refused")),
            pending_polls: 0,
            polls: AtomicUsize::new(0),
        };

        dispatcher(engine, repo.clone(), Duration::from_secs(5))
            .spawn(proposal.clone(), json!({}))
            .await
            .unwrap();

        let stored = repo.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("model refused"));
    }

    #[tokio::test]
    async fn test_run_that_never_finishes_times_out() {
        let repo = InMemoryProposalRepository::new();
        let proposal = dispatched(&repo).await;

        let engine = ScriptedEngine {
            invoke_error: None,
            assigned_thread_id: None,
            final_state: state(EngineRunStatus::Completed, GeneratedFiles::new(), None),
            pending_polls: usize::MAX,
            polls: AtomicUsize::new(0),
        };

        dispatcher(engine, repo.clone(), Duration::from_millis(50))
            .spawn(proposal.clone(), json!({}))
            .await
            .unwrap();

        let stored = repo.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Failed);
        assert!(stored.failure_reason.unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_engine_assigned_thread_is_persisted() {
        let repo = InMemoryProposalRepository::new();
        let proposal = dispatched(&repo).await;

        let engine = ScriptedEngine {
            invoke_error: None,
            assigned_thread_id: Some("engine-thread-42".to_string()),
            final_state: state(EngineRunStatus::Completed, GeneratedFiles::new(), None),
            pending_polls: 1,
            polls: AtomicUsize::new(0),
        };

        dispatcher(engine, repo.clone(), Duration::from_secs(5))
            .spawn(proposal.clone(), json!({}))
            .await
            .unwrap();

        let stored = repo.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Completed);
        assert_eq!(stored.thread_id, "engine-thread-42");
        assert_eq!(
            repo.find_by_thread_id("engine-thread-42").await.unwrap().unwrap().id,
            proposal.id
        );
    }
}
