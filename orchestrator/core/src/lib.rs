// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spec gateway core.
//!
//! Authenticated API gateway in front of the spec engine: token issuance and
//! validation, workflow and refinement orchestration with per-user
//! ownership, and a WebSocket bridge for live engine events.
//!
//! # Architecture
//!
//! - **domain** - aggregates, state machine, ports (`SpecEngine`, repositories)
//! - **application** - login and orchestration use cases, background dispatch
//! - **infrastructure** - token authority, argon2, PostgreSQL, spec engine client
//! - **presentation** - axum router, auth gate, stream bridge

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
