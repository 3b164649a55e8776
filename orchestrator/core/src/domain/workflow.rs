// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Aggregate
//!
//! A named agent specification owned by the user who created it. The
//! `specification` payload is opaque to the gateway; it is forwarded to the
//! spec engine as the agent definition when a refinement is dispatched.
//!
//! Workflows are immutable after creation and carry no name uniqueness
//! constraint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier taken from a request path.
    ///
    /// Returns `None` for anything that is not a well-formed id, which the
    /// application layer reports as not-found.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub specification: serde_json::Value,
    /// Subject id of the creator. Never changes.
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow name is required")]
    MissingName,
}

impl Workflow {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        specification: serde_json::Value,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WorkflowError::MissingName);
        }
        let now = Utc::now();
        Ok(Self {
            id: WorkflowId::new(),
            name,
            description: description.into(),
            specification,
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.owner_id == subject_id
    }
}
