// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model of the spec gateway: identities, workflows, refinement
//! proposals, the spec engine contract and repository interfaces.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, invariants and ports; no I/O

pub mod identity;
pub mod user;
pub mod workflow;
pub mod proposal;
pub mod events;
pub mod spec_engine;
pub mod repository;
pub mod gateway_config;
