// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod serve;
pub mod token;
pub mod user;

pub use config::ConfigCommand;
pub use token::TokenCommand;
pub use user::UserCommand;
