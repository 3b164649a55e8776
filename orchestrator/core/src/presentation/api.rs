// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP surface of the gateway.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | GET | `/api/health` | public |
//! | POST | `/api/auth/login` | public |
//! | GET | `/api/auth/me` | bearer |
//! | POST, GET | `/api/workflows` | bearer |
//! | GET | `/api/workflows/{id}` | bearer |
//! | POST | `/api/workflows/{id}/refinements` | bearer |
//! | GET | `/api/refinements/{id}` | bearer |
//! | POST | `/api/refinements/{id}/approve`, `/reject` | bearer |
//! | GET | `/api/ws/refinements/{thread_id}` | bearer (WebSocket) |
//!
//! Every error body is `{"error": "<message>"}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::login::{LoginError, LoginService};
use crate::application::orchestration::{
    CreateRefinementRequest, CreateWorkflowRequest, OrchestrationError, OrchestrationService,
};
use crate::application::refinement_dispatch::{DispatchSettings, RefinementDispatcher};
use crate::application::repository_factory::Repositories;
use crate::domain::gateway_config::GatewayConfigManifest;
use crate::domain::identity::Caller;
use crate::domain::proposal::Proposal;
use crate::domain::spec_engine::SpecEngine;
use crate::domain::user::PasswordHasher;
use crate::infrastructure::auth::{TokenAuthority, TokenError};
use crate::infrastructure::event_bus::EventBus;
use crate::presentation::{auth_gate, stream_bridge};

pub struct AppState {
    pub tokens: Arc<TokenAuthority>,
    pub login: Arc<LoginService>,
    pub orchestration: Arc<OrchestrationService>,
    pub engine: Arc<dyn SpecEngine>,
    pub event_bus: Arc<EventBus>,
    pub stream_read_timeout: Duration,
}

impl AppState {
    /// Wire the services from configuration.
    pub fn from_config(
        config: &GatewayConfigManifest,
        repositories: Repositories,
        engine: Arc<dyn SpecEngine>,
        hasher: Arc<dyn PasswordHasher>,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let secret = config.signing_secret();
        let tokens = Arc::new(TokenAuthority::new(secret.as_deref()));
        let engine_config = &config.spec.spec_engine;

        let login = Arc::new(LoginService::new(
            repositories.users.clone(),
            hasher,
            tokens.clone(),
            config.spec.auth.token_ttl,
        ));

        let dispatcher = RefinementDispatcher::new(
            engine.clone(),
            repositories.proposals.clone(),
            event_bus.clone(),
            DispatchSettings {
                poll_interval: engine_config.completion_poll_interval,
                completion_timeout: engine_config.completion_timeout,
            },
        );

        let orchestration = Arc::new(OrchestrationService::new(
            repositories.workflows.clone(),
            repositories.proposals.clone(),
            dispatcher,
            event_bus.clone(),
        ));

        Arc::new(Self {
            tokens,
            login,
            orchestration,
            engine,
            event_bus,
            stream_read_timeout: engine_config.stream_read_timeout,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(login_handler));

    let protected = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/workflows", post(create_workflow_handler).get(list_workflows_handler))
        .route("/workflows/{id}", get(get_workflow_handler))
        .route("/workflows/{id}/refinements", post(create_refinement_handler))
        .route("/refinements/{id}", get(get_proposal_handler))
        .route("/refinements/{id}/approve", post(approve_proposal_handler))
        .route("/refinements/{id}/reject", post(reject_proposal_handler))
        .route("/ws/refinements/{thread_id}", get(stream_bridge::stream_refinement_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_gate::require_auth));

    Router::new()
        .nest("/api", public.merge(protected))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(e: OrchestrationError) -> Self {
        match e {
            OrchestrationError::Validation(m) => ApiError::BadRequest(m),
            e @ OrchestrationError::NotFound(_) => ApiError::NotFound(capitalize(&e.to_string())),
            e @ OrchestrationError::Forbidden(_) => ApiError::Forbidden(capitalize(&e.to_string())),
            e @ OrchestrationError::Conflict { .. } => ApiError::Conflict(capitalize(&e.to_string())),
            OrchestrationError::Repository(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        match e {
            LoginError::InvalidCredentials => ApiError::Unauthorized("Invalid email or password".to_string()),
            LoginError::MissingCredentials => ApiError::BadRequest("Email and password are required".to_string()),
            LoginError::Token(TokenError::ConfigurationError) => {
                ApiError::Internal("token signing secret is not configured".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let result = state
        .login
        .login(&body.email.unwrap_or_default(), &body.password.unwrap_or_default())
        .await?;
    Ok(Json(result))
}

async fn me_handler(Extension(caller): Extension<Caller>) -> Json<serde_json::Value> {
    Json(json!({
        "user_id": caller.subject_id,
        "display_name": caller.display_name,
        "roles": caller.roles,
        "message": "Access granted",
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub specification: Option<serde_json::Value>,
}

async fn create_workflow_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateWorkflowBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let workflow = state
        .orchestration
        .create_workflow(
            &caller,
            CreateWorkflowRequest {
                name: body.name,
                description: body.description,
                specification: body.specification,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn list_workflows_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestration.list_workflows(&caller).await?))
}

async fn get_workflow_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestration.get_workflow(&caller, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRefinementBody {
    pub instructions: Option<String>,
    pub context: Option<String>,
}

/// Proposal as returned to clients; `proposal_id` duplicates `id` for
/// clients that expect it.
#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal_id: String,
    #[serde(flatten)]
    pub proposal: Proposal,
}

impl From<Proposal> for ProposalResponse {
    fn from(proposal: Proposal) -> Self {
        Self {
            proposal_id: proposal.id.to_string(),
            proposal,
        }
    }
}

async fn create_refinement_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<CreateRefinementBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let proposal = state
        .orchestration
        .create_refinement(
            &caller,
            &id,
            CreateRefinementRequest {
                instructions: body.instructions,
                context: body.context,
            },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ProposalResponse::from(proposal))))
}

async fn get_proposal_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = state.orchestration.get_proposal(&caller, &id).await?;
    Ok(Json(ProposalResponse::from(proposal)))
}

async fn approve_proposal_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = state.orchestration.approve_proposal(&caller, &id).await?;
    Ok(Json(ProposalResponse::from(proposal)))
}

async fn reject_proposal_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let proposal = state.orchestration.reject_proposal(&caller, &id).await?;
    Ok(Json(ProposalResponse::from(proposal)))
}
