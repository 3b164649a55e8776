// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Auth Gate
//!
//! Request interception for protected routes. Reads the single
//! `Authorization` header, requires exactly `Bearer <token>` (case-sensitive
//! prefix, one space, non-empty token without whitespace), validates the
//! token with the [`TokenAuthority`] and attaches the verified [`Caller`] to
//! the request extensions.
//!
//! A missing header has its own message. Every other failure (bad header
//! shape, bad signature, expired or malformed token) is reported with one
//! identical 401 so callers cannot tell them apart.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::domain::identity::Caller;
use crate::infrastructure::auth::{TokenAuthority, TokenError};
use crate::presentation::api::{ApiError, AppState};

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthGateError {
    #[error("Missing authorization header")]
    MissingCredential,

    #[error("Invalid authorization credentials")]
    MalformedCredential,

    #[error("Invalid authorization credentials")]
    InvalidToken(TokenError),
}

impl AuthGateError {
    fn reason(&self) -> &'static str {
        match self {
            AuthGateError::MissingCredential => "missing",
            AuthGateError::MalformedCredential => "malformed",
            AuthGateError::InvalidToken(TokenError::Expired) => "expired",
            AuthGateError::InvalidToken(TokenError::BadSignature) => "bad_signature",
            AuthGateError::InvalidToken(TokenError::MalformedToken) => "malformed_token",
            AuthGateError::InvalidToken(TokenError::ConfigurationError) => "configuration",
        }
    }
}

/// Extract the token from a header value of the form `Bearer <token>`.
pub fn parse_bearer(value: &str) -> Result<&str, AuthGateError> {
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthGateError::MalformedCredential)?;
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(AuthGateError::MalformedCredential);
    }
    Ok(token)
}

pub fn authenticate(tokens: &TokenAuthority, headers: &HeaderMap) -> Result<Caller, AuthGateError> {
    let mut values = headers.get_all(header::AUTHORIZATION).iter();
    let value = values.next().ok_or(AuthGateError::MissingCredential)?;
    if values.next().is_some() {
        return Err(AuthGateError::MalformedCredential);
    }

    let value = value.to_str().map_err(|_| AuthGateError::MalformedCredential)?;
    let token = parse_bearer(value)?;

    let claims = tokens.validate(token).map_err(AuthGateError::InvalidToken)?;
    Ok(claims.caller())
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match authenticate(&state.tokens, request.headers()) {
        Ok(caller) => {
            debug!(subject_id = %caller.subject_id, path = %request.uri().path(), "Request authenticated");
            request.extensions_mut().insert(caller);
            Ok(next.run(request).await)
        }
        Err(e) => {
            if matches!(e, AuthGateError::InvalidToken(TokenError::ConfigurationError)) {
                error!("Token validation attempted without a configured signing secret");
            }
            metrics::counter!("gateway_auth_failures_total", "reason" => e.reason()).increment(1);
            debug!(reason = e.reason(), path = %request.uri().path(), "Request rejected by auth gate");
            Err(ApiError::Unauthorized(e.to_string()))
        }
    }
}
