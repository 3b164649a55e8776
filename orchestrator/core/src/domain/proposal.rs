// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Refinement Proposal Aggregate
//!
//! A proposal records one requested change to a [`Workflow`](crate::domain::workflow::Workflow)
//! and the spec engine's answer to it.
//!
//! ## State Machine
//!
//! ```text
//! Created ──► Dispatched ──► Completed ──► Approved
//!                  │              └──────► Rejected
//!                  └──────► Failed
//! ```
//!
//! `Approved`, `Rejected` and `Failed` are terminal. `Created` and
//! `Dispatched` are in-flight. Every transition is applied by the store as a
//! conditional update on the expected source status (see
//! [`ProposalTransition`]), so two gateway instances racing on the same
//! proposal cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::workflow::WorkflowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Files produced by the engine, keyed by path. Content is kept as the
/// engine reported it.
pub type GeneratedFiles = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Created,
    Dispatched,
    Completed,
    Failed,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Created => "created",
            ProposalStatus::Dispatched => "dispatched",
            ProposalStatus::Completed => "completed",
            ProposalStatus::Failed => "failed",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Failed | ProposalStatus::Approved | ProposalStatus::Rejected
        )
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Created, Dispatched)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Completed, Approved)
                | (Completed, Rejected)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = ProposalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ProposalStatus::Created),
            "dispatched" => Ok(ProposalStatus::Dispatched),
            "completed" => Ok(ProposalStatus::Completed),
            "failed" => Ok(ProposalStatus::Failed),
            "approved" => Ok(ProposalStatus::Approved),
            "rejected" => Ok(ProposalStatus::Rejected),
            other => Err(ProposalError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("refinement instructions are required")]
    MissingInstructions,

    #[error("invalid proposal transition from {from} to {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("unknown proposal status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub workflow_id: WorkflowId,
    /// Correlates the proposal with the engine's execution and its live
    /// event stream.
    pub thread_id: String,
    pub instructions: String,
    pub context: Option<String>,
    pub status: ProposalStatus,
    /// Empty until the proposal reaches `Completed`.
    pub generated_files: GeneratedFiles,
    pub failure_reason: Option<String>,
    pub created_by: String,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        workflow_id: WorkflowId,
        created_by: impl Into<String>,
        instructions: impl Into<String>,
        context: Option<String>,
    ) -> Result<Self, ProposalError> {
        let instructions = instructions.into();
        if instructions.trim().is_empty() {
            return Err(ProposalError::MissingInstructions);
        }
        Ok(Self {
            id: ProposalId::new(),
            workflow_id,
            thread_id: Uuid::new_v4().to_string(),
            instructions,
            context: context.filter(|c| !c.is_empty()),
            status: ProposalStatus::Created,
            generated_files: GeneratedFiles::new(),
            failure_reason: None,
            created_by: created_by.into(),
            resolved_by: None,
            created_at: Utc::now(),
            completed_at: None,
            resolved_at: None,
        })
    }

    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.created_by == subject_id
    }

    /// Apply a transition in memory. Stores call this after matching the
    /// expected source status so the in-memory and SQL paths agree.
    pub fn apply(&mut self, transition: &ProposalTransition) -> Result<(), ProposalError> {
        if self.status != transition.from || !self.status.can_transition_to(transition.to) {
            return Err(ProposalError::InvalidTransition {
                from: self.status,
                to: transition.to,
            });
        }
        self.status = transition.to;
        match transition.to {
            ProposalStatus::Completed => {
                self.generated_files = transition.generated_files.clone().unwrap_or_default();
                self.completed_at = Some(transition.at);
            }
            ProposalStatus::Failed => {
                self.failure_reason = transition.failure_reason.clone();
                self.completed_at = Some(transition.at);
            }
            ProposalStatus::Approved | ProposalStatus::Rejected => {
                self.resolved_by = transition.actor.clone();
                self.resolved_at = Some(transition.at);
            }
            ProposalStatus::Created | ProposalStatus::Dispatched => {}
        }
        Ok(())
    }
}

/// A conditional status change: applies only if the stored proposal is
/// still in `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalTransition {
    pub from: ProposalStatus,
    pub to: ProposalStatus,
    pub generated_files: Option<GeneratedFiles>,
    pub failure_reason: Option<String>,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProposalTransition {
    fn new(from: ProposalStatus, to: ProposalStatus) -> Self {
        Self {
            from,
            to,
            generated_files: None,
            failure_reason: None,
            actor: None,
            at: Utc::now(),
        }
    }

    pub fn dispatch() -> Self {
        Self::new(ProposalStatus::Created, ProposalStatus::Dispatched)
    }

    pub fn complete(files: GeneratedFiles) -> Self {
        Self {
            generated_files: Some(files),
            ..Self::new(ProposalStatus::Dispatched, ProposalStatus::Completed)
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::new(ProposalStatus::Dispatched, ProposalStatus::Failed)
        }
    }

    pub fn approve(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            ..Self::new(ProposalStatus::Completed, ProposalStatus::Approved)
        }
    }

    pub fn reject(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            ..Self::new(ProposalStatus::Completed, ProposalStatus::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposal() -> Proposal {
        Proposal::new(WorkflowId::new(), "user-a", "Add error handling", Some("ctx".into())).unwrap()
    }

    #[test]
    fn test_new_proposal_starts_created_with_thread_id() {
        let p = proposal();
        assert_eq!(p.status, ProposalStatus::Created);
        assert!(!p.thread_id.is_empty());
        assert!(p.generated_files.is_empty());
    }

    #[test]
    fn test_empty_instructions_rejected() {
        let err = Proposal::new(WorkflowId::new(), "user-a", "", None).unwrap_err();
        assert_eq!(err, ProposalError::MissingInstructions);
    }

    #[test]
    fn test_happy_path_to_approved() {
        let mut p = proposal();
        p.apply(&ProposalTransition::dispatch()).unwrap();

        let mut files = GeneratedFiles::new();
        files.insert("/definition.json".into(), json!({"content": ["{}"]}));
        p.apply(&ProposalTransition::complete(files.clone())).unwrap();
        assert_eq!(p.status, ProposalStatus::Completed);
        assert_eq!(p.generated_files, files);
        assert!(p.completed_at.is_some());

        p.apply(&ProposalTransition::approve("user-a")).unwrap();
        assert_eq!(p.status, ProposalStatus::Approved);
        assert_eq!(p.resolved_by.as_deref(), Some("user-a"));
        assert!(p.status.is_terminal());
    }

    #[test]
    fn test_failed_proposal_has_no_files() {
        let mut p = proposal();
        p.apply(&ProposalTransition::dispatch()).unwrap();
        p.apply(&ProposalTransition::fail("engine unreachable")).unwrap();
        assert_eq!(p.status, ProposalStatus::Failed);
        assert!(p.generated_files.is_empty());
        assert_eq!(p.failure_reason.as_deref(), Some("engine unreachable"));
    }

    #[test]
    fn test_approve_requires_completed() {
        let mut p = proposal();
        p.apply(&ProposalTransition::dispatch()).unwrap();
        let err = p.apply(&ProposalTransition::approve("user-a")).unwrap_err();
        assert_eq!(
            err,
            ProposalError::InvalidTransition {
                from: ProposalStatus::Dispatched,
                to: ProposalStatus::Approved
            }
        );
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for from in [ProposalStatus::Failed, ProposalStatus::Approved, ProposalStatus::Rejected] {
            for to in [
                ProposalStatus::Created,
                ProposalStatus::Dispatched,
                ProposalStatus::Completed,
                ProposalStatus::Approved,
                ProposalStatus::Rejected,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_status_string_form() {
        for status in [
            ProposalStatus::Created,
            ProposalStatus::Dispatched,
            ProposalStatus::Completed,
            ProposalStatus::Failed,
            ProposalStatus::Approved,
            ProposalStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ProposalStatus>().unwrap(), status);
        }
        assert_eq!(serde_json::to_value(ProposalStatus::Completed).unwrap(), json!("completed"));
        assert!("resolved".parse::<ProposalStatus>().is_err());
    }
}
