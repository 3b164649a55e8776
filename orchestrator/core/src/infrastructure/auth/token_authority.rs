// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Token Authority
//!
//! Issues and validates HS256-signed identity tokens. Validation is a pure
//! function of the signing secret, the token and the current time: there is
//! no session table and no revocation list, so any number of concurrent
//! validations of one token succeed independently.
//!
//! Expiry is tracked with millisecond precision in custom `iat_ms` /
//! `exp_ms` claims; the library's own second-granularity `exp` check (and
//! its leeway) is disabled.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::identity::IdentityClaims;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("no token signing secret is configured")]
    ConfigurationError,

    #[error("token is malformed")]
    MalformedToken,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

/// Wire form of the claims.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    name: String,
    roles: Vec<String>,
    iat_ms: i64,
    exp_ms: i64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Holds the process-wide signing secret. Constructed once at startup and
/// shared behind an `Arc`.
pub struct TokenAuthority {
    keys: Option<SigningKeys>,
}

impl TokenAuthority {
    pub fn new(secret: Option<&str>) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| SigningKeys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self { keys }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    /// Sign a token for the given identity. Empty subject ids, display names
    /// and role sets are accepted.
    pub fn issue(
        &self,
        subject_id: &str,
        display_name: &str,
        roles: &[String],
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::ConfigurationError)?;

        let issued_at = Utc::now();
        // expires_at must be strictly after issued_at
        let ttl = ChronoDuration::from_std(ttl)
            .unwrap_or(ChronoDuration::MAX)
            .max(ChronoDuration::milliseconds(1));
        let expires_at = issued_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let claims = TokenClaims {
            sub: subject_id.to_string(),
            name: display_name.to_string(),
            roles: roles.to_vec(),
            iat_ms: issued_at.timestamp_millis(),
            exp_ms: expires_at.timestamp_millis(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign identity token");
            TokenError::ConfigurationError
        })
    }

    pub fn validate(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::ConfigurationError)?;

        // header.payload.signature, nothing more and nothing empty
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(TokenError::MalformedToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let data = decode::<TokenClaims>(token, &keys.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            _ => TokenError::MalformedToken,
        })?;

        let claims = data.claims;
        let issued_at = Utc
            .timestamp_millis_opt(claims.iat_ms)
            .single()
            .ok_or(TokenError::MalformedToken)?;
        let expires_at = Utc
            .timestamp_millis_opt(claims.exp_ms)
            .single()
            .ok_or(TokenError::MalformedToken)?;

        let identity = IdentityClaims {
            subject_id: claims.sub,
            display_name: claims.name,
            roles: claims.roles,
            issued_at,
            expires_at,
        };

        if !identity.is_valid_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(identity)
    }
}
