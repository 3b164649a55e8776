// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod api;
pub mod auth_gate;
pub mod stream_bridge;

pub use api::{router, ApiError, AppState};
