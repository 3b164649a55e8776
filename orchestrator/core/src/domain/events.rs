// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::domain::proposal::{ProposalId, ProposalStatus};
use crate::domain::workflow::WorkflowId;

/// Workflow lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    WorkflowCreated {
        workflow_id: WorkflowId,
        owner_id: String,
        name: String,
        created_at: DateTime<Utc>,
    },
}

/// Refinement proposal events, one per state machine transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProposalEvent {
    ProposalCreated {
        proposal_id: ProposalId,
        workflow_id: WorkflowId,
        thread_id: String,
        created_by: String,
        created_at: DateTime<Utc>,
    },
    ProposalDispatched {
        proposal_id: ProposalId,
        thread_id: String,
        dispatched_at: DateTime<Utc>,
    },
    ProposalCompleted {
        proposal_id: ProposalId,
        file_count: usize,
        completed_at: DateTime<Utc>,
    },
    ProposalFailed {
        proposal_id: ProposalId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    ProposalResolved {
        proposal_id: ProposalId,
        resolution: ProposalStatus,
        resolved_by: String,
        resolved_at: DateTime<Utc>,
    },
}

impl ProposalEvent {
    pub fn proposal_id(&self) -> ProposalId {
        match self {
            ProposalEvent::ProposalCreated { proposal_id, .. }
            | ProposalEvent::ProposalDispatched { proposal_id, .. }
            | ProposalEvent::ProposalCompleted { proposal_id, .. }
            | ProposalEvent::ProposalFailed { proposal_id, .. }
            | ProposalEvent::ProposalResolved { proposal_id, .. } => *proposal_id,
        }
    }
}
