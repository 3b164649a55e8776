// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Spec Engine Contract
//!
//! The upstream agent execution engine is a black box with three calls:
//!
//! | Call | Upstream route | Purpose |
//! |------|----------------|---------|
//! | [`SpecEngine::invoke`] | `POST /invoke` | start an execution for a thread |
//! | [`SpecEngine::fetch_state`] | `GET /state/{thread_id}` | read the execution's current/terminal state |
//! | [`SpecEngine::open_event_stream`] | `WS /stream/{thread_id}` | live structured events until `end` |
//!
//! The HTTP/WebSocket implementation lives in
//! `crate::infrastructure::spec_engine_client`. The engine is the authority on
//! execution outcome; the gateway only records what it reports.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

use crate::domain::proposal::GeneratedFiles;

/// Reserved event type that closes an execution's event stream.
pub const TERMINAL_EVENT_TYPE: &str = "end";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeRequest {
    pub job_id: String,
    pub trace_id: String,
    pub thread_id: String,
    pub agent_definition: serde_json::Value,
    pub input_payload: RefinementPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinementPayload {
    pub instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeResponse {
    pub thread_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineRunStatus {
    Completed,
    #[serde(alias = "error")]
    Failed,
    /// Anything else the engine reports while the run is still going
    /// (`started`, `running`, `pending`, ...).
    #[serde(other)]
    InProgress,
}

impl EngineRunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineRunStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadState {
    #[serde(default)]
    pub thread_id: String,
    pub status: EngineRunStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub generated_files: GeneratedFiles,
    #[serde(default)]
    pub error: Option<String>,
}

/// One event from the engine stream.
///
/// `raw` keeps the exact text frame so the stream bridge can forward it
/// verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    raw: String,
}

#[derive(Deserialize)]
struct EventEnvelope {
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl EngineEvent {
    pub fn from_text(text: impl Into<String>) -> Result<Self, EngineError> {
        let raw = text.into();
        let envelope: EventEnvelope = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Protocol(format!("invalid stream event: {}", e)))?;
        Ok(Self {
            event_type: envelope.event_type,
            data: envelope.data,
            raw,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == TERMINAL_EVENT_TYPE
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

pub type EngineEventStream = Pin<Box<dyn Stream<Item = Result<EngineEvent, EngineError>> + Send>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("spec engine unavailable: {0}")]
    Unavailable(String),

    #[error("spec engine has no record of thread {0}")]
    NotFound(String),

    #[error("spec engine protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait SpecEngine: Send + Sync {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, EngineError>;

    async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, EngineError>;

    /// Open the live event stream for a thread. Dropping the returned stream
    /// releases the upstream connection.
    async fn open_event_stream(&self, thread_id: &str) -> Result<EngineEventStream, EngineError>;
}
