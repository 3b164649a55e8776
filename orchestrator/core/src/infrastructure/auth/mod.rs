// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod password;
pub mod token_authority;

pub use password::Argon2PasswordHasher;
pub use token_authority::{TokenAuthority, TokenError};
