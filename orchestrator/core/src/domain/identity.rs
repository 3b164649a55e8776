// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Caller Identity
//!
//! Verified identity claims produced by the token authority
//! (`crate::infrastructure::auth::token_authority`) and consumed by the auth
//! gate and every orchestration use case.
//!
//! Claims are never persisted: the signed token is their only durable form
//! and there is no server-side revocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoded, verified payload of an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdentityClaims {
    /// A claims object is valid only strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn caller(&self) -> Caller {
        Caller {
            subject_id: self.subject_id.clone(),
            display_name: self.display_name.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// The identity attached to a request once the auth gate has verified it.
///
/// Ownership checks compare resource owners against `subject_id` and
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub subject_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn owns(&self, owner_id: &str) -> bool {
        self.subject_id == owner_id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
