// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the gateway integration tests: a mock spec engine
//! served on an ephemeral port and a gateway router wired to it with
//! in-memory repositories.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceExt;

use gateway_core::application::Repositories;
use gateway_core::domain::gateway_config::GatewayConfigManifest;
use gateway_core::infrastructure::auth::Argon2PasswordHasher;
use gateway_core::infrastructure::event_bus::EventBus;
use gateway_core::infrastructure::HttpSpecEngineClient;
use gateway_core::presentation::{router, AppState};

pub const SIGNING_SECRET: &str = "integration-test-secret";

/// How the mock engine's `/stream/{thread_id}` socket behaves after the
/// scripted frames have been sent.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StreamEnding {
    Close,
    Stall,
}

pub struct MockEngineConfig {
    /// Thread id returned by `/invoke` instead of echoing the gateway's.
    pub assigned_thread_id: Option<String>,
    pub generated_files: Value,
    pub stream_frames: Vec<Value>,
    pub stream_ending: StreamEnding,
}

impl Default for MockEngineConfig {
    fn default() -> Self {
        Self {
            assigned_thread_id: None,
            generated_files: json!({
                "/definition.json": {"content": ["{\"nodes\": [\"triage\", \"answer\"]}"]},
                "/tools.py": {"content": ["def search(query):", "    return []"]}
            }),
            stream_frames: vec![
                json!({"event_type": "on_chain_start", "data": {"step": 1}}),
                json!({"event_type": "on_state_update", "data": {"messages": "drafting"}}),
                json!({"event_type": "on_state_update", "data": {"messages": "done"}}),
                json!({"event_type": "end", "data": {}}),
            ],
            stream_ending: StreamEnding::Close,
        }
    }
}

struct MockEngineState {
    config: MockEngineConfig,
    threads: Mutex<HashSet<String>>,
    stream_released: Arc<Notify>,
}

pub struct MockEngine {
    pub addr: SocketAddr,
    pub generated_files: Value,
    pub stream_frames: Vec<Value>,
    /// Notified each time a `/stream` socket is closed by the gateway.
    pub stream_released: Arc<Notify>,
}

impl MockEngine {
    pub async fn start(config: MockEngineConfig) -> Self {
        let generated_files = config.generated_files.clone();
        let stream_frames = config.stream_frames.clone();
        let stream_released = Arc::new(Notify::new());
        let state = Arc::new(MockEngineState {
            config,
            threads: Mutex::new(HashSet::new()),
            stream_released: stream_released.clone(),
        });

        let app = Router::new()
            .route("/invoke", post(invoke))
            .route("/state/{thread_id}", get(thread_state))
            .route("/stream/{thread_id}", get(stream))
            .with_state(state);

        let addr = serve(app).await;
        Self {
            addr,
            generated_files,
            stream_frames,
            stream_released,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn invoke(State(state): State<Arc<MockEngineState>>, Json(body): Json<Value>) -> Json<Value> {
    let thread_id = match &state.config.assigned_thread_id {
        Some(assigned) => assigned.clone(),
        None => body["thread_id"].as_str().unwrap_or_default().to_string(),
    };
    state.threads.lock().unwrap().insert(thread_id.clone());
    Json(json!({"thread_id": thread_id, "status": "started"}))
}

async fn thread_state(
    State(state): State<Arc<MockEngineState>>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    if !state.threads.lock().unwrap().contains(&thread_id) {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "unknown thread"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "thread_id": thread_id,
            "status": "completed",
            "result": {"summary": "refined"},
            "generated_files": state.config.generated_files,
        })),
    )
}

async fn stream(State(state): State<Arc<MockEngineState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |mut socket| async move {
        for frame in &state.config.stream_frames {
            if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
        match state.config.stream_ending {
            StreamEnding::Close => {
                let _ = socket.send(Message::Close(None)).await;
            }
            StreamEnding::Stall => {
                // silent, but keep reading so a gateway-side close is seen
                let _ = tokio::time::timeout(Duration::from_secs(60), async {
                    while let Some(Ok(message)) = socket.recv().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                })
                .await;
                state.stream_released.notify_one();
            }
        }
    })
}

/// Accepts TCP connections and holds them without ever answering.
pub async fn silent_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Serve `app` on an ephemeral localhost port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct TestGateway {
    pub app: Router,
    pub state: Arc<AppState>,
    pub repositories: Repositories,
}

pub fn gateway(engine_url: &str) -> TestGateway {
    gateway_with_read_timeout(engine_url, Duration::from_secs(5))
}

pub fn gateway_with_read_timeout(engine_url: &str, stream_read_timeout: Duration) -> TestGateway {
    let mut config = GatewayConfigManifest::default();
    config.spec.auth.jwt_secret = Some(SIGNING_SECRET.to_string());
    config.spec.spec_engine.url = engine_url.to_string();
    config.spec.spec_engine.completion_poll_interval = Duration::from_millis(10);
    config.spec.spec_engine.completion_timeout = Duration::from_secs(5);
    config.spec.spec_engine.stream_read_timeout = stream_read_timeout;

    let repositories = Repositories::in_memory();
    let engine = HttpSpecEngineClient::new(engine_url, Duration::from_secs(2)).unwrap();
    let state = AppState::from_config(
        &config,
        repositories.clone(),
        Arc::new(engine),
        Arc::new(Argon2PasswordHasher::new()),
        Arc::new(EventBus::new(256)),
    );

    TestGateway {
        app: router(state.clone()),
        state,
        repositories,
    }
}

impl TestGateway {
    pub fn token_for(&self, subject_id: &str) -> String {
        self.state
            .tokens
            .issue(
                subject_id,
                &format!("{subject_id}@example.com"),
                &["user".to_string()],
                Duration::from_secs(300),
            )
            .unwrap()
    }

    /// Send one request through the router and decode the JSON body
    /// (`Value::Null` for an empty body).
    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        decode(response).await
    }

    pub async fn create_workflow(&self, token: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/workflows",
                Some(token),
                Some(json!({
                    "name": "Support triage",
                    "description": "Routes incoming tickets",
                    "specification": {"nodes": ["triage"], "edges": []}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_refinement(&self, token: &str, workflow_id: &str) -> Value {
        let (status, body) = self
            .call(
                "POST",
                &format!("/api/workflows/{workflow_id}/refinements"),
                Some(token),
                Some(json!({"instructions": "Add an escalation step", "context": "VIP customers"})),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        body
    }

    /// Poll the proposal until it leaves the in-flight states.
    pub async fn wait_for_terminal(&self, token: &str, proposal_id: &str) -> Value {
        for _ in 0..300 {
            let (status, body) = self
                .call("GET", &format!("/api/refinements/{proposal_id}"), Some(token), None)
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            if !matches!(body["status"].as_str(), Some("created") | Some("dispatched")) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("proposal {proposal_id} never finished");
    }
}

pub async fn decode(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}
