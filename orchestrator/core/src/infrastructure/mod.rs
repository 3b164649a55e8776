// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod auth;
pub mod db;
pub mod event_bus;
pub mod repositories;
pub mod spec_engine_client;

pub use spec_engine_client::HttpSpecEngineClient;
