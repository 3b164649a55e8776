// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP + WebSocket client for the upstream spec engine.
//!
//! `invoke` and `fetch_state` are plain JSON calls bounded by the configured
//! request timeout. `open_event_stream` connects to `ws(s)://.../stream/{id}`
//! and yields one [`EngineEvent`] per text frame; the socket is closed when
//! the returned stream is dropped. The WebSocket handshake is bounded by the
//! same request timeout.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::domain::spec_engine::{
    EngineError, EngineEvent, EngineEventStream, InvokeRequest, InvokeResponse, SpecEngine, ThreadState,
};

pub struct HttpSpecEngineClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpSpecEngineClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid spec engine url '{}': {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Spec engine url '{}' cannot be used as a base", base_url);
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| EngineError::Protocol(format!("invalid base url {}", self.base_url)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn stream_url(&self, thread_id: &str) -> Result<Url, EngineError> {
        let mut url = self.endpoint(&["stream", thread_id])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| EngineError::Protocol(format!("cannot derive websocket url from {}", self.base_url)))?;
        Ok(url)
    }
}

fn transport_error(e: reqwest::Error) -> EngineError {
    EngineError::Unavailable(e.to_string())
}

#[async_trait]
impl SpecEngine for HttpSpecEngineClient {
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, EngineError> {
        let url = self.endpoint(&["invoke"])?;
        debug!(thread_id = %request.thread_id, job_id = %request.job_id, "Invoking spec engine");

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Unavailable(format!("invoke returned {}: {}", status, body)));
        }

        response
            .json::<InvokeResponse>()
            .await
            .map_err(|e| EngineError::Protocol(format!("invalid invoke response: {}", e)))
    }

    async fn fetch_state(&self, thread_id: &str) -> Result<ThreadState, EngineError> {
        let url = self.endpoint(&["state", thread_id])?;

        let response = self.client.get(url).send().await.map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(thread_id.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(EngineError::Unavailable(format!("state returned {}: {}", status, body)))
            }
            _ => response
                .json::<ThreadState>()
                .await
                .map_err(|e| EngineError::Protocol(format!("invalid state response: {}", e))),
        }
    }

    async fn open_event_stream(&self, thread_id: &str) -> Result<EngineEventStream, EngineError> {
        let url = self.stream_url(thread_id)?;
        debug!(%url, "Opening spec engine event stream");

        let (socket, _response) =
            tokio::time::timeout(self.request_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    EngineError::Unavailable(format!(
                        "stream handshake did not complete within {:?}",
                        self.request_timeout
                    ))
                })?
                .map_err(|e| EngineError::Unavailable(format!("stream connect failed: {}", e)))?;

        let events = socket.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(EngineEvent::from_text(text.as_str())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| EngineError::Protocol(format!("non utf-8 binary frame: {}", e)))
                        .and_then(EngineEvent::from_text),
                ),
                // Close ends the stream once tungstenite reports it as finished
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Spec engine stream errored");
                    Some(Err(EngineError::Unavailable(e.to_string())))
                }
            }
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spec_engine::{EngineRunStatus, RefinementPayload};
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> InvokeRequest {
        InvokeRequest {
            job_id: "job-1".to_string(),
            trace_id: "trace-1".to_string(),
            thread_id: "thread-1".to_string(),
            agent_definition: json!({"nodes": []}),
            input_payload: RefinementPayload {
                instructions: "add retries".to_string(),
                context: None,
            },
        }
    }

    #[tokio::test]
    async fn test_invoke_posts_request_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/invoke")
            .match_body(Matcher::PartialJson(json!({
                "thread_id": "thread-1",
                "input_payload": {"instructions": "add retries"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"thread_id":"thread-1","status":"started"}"#)
            .create_async()
            .await;

        let client = HttpSpecEngineClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = client.invoke(&request()).await.unwrap();

        assert_eq!(response.thread_id, "thread-1");
        assert_eq!(response.status, "started");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invoke_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/invoke").with_status(503).create_async().await;

        let client = HttpSpecEngineClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(matches!(client.invoke(&request()).await, Err(EngineError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_invoke_connection_refused_is_unavailable() {
        // port 9 (discard) is not expected to be listening
        let client = HttpSpecEngineClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(client.invoke(&request()).await, Err(EngineError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/state/thread-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "thread_id": "thread-1",
                    "status": "completed",
                    "generated_files": {"/agent.py": {"content": ["print()"]}}
                })
                .to_string(),
            )
            .create_async()
            .await;
        server.mock("GET", "/state/unknown").with_status(404).create_async().await;

        let client = HttpSpecEngineClient::new(&server.url(), Duration::from_secs(5)).unwrap();

        let state = client.fetch_state("thread-1").await.unwrap();
        assert_eq!(state.status, EngineRunStatus::Completed);
        assert!(state.generated_files.contains_key("/agent.py"));

        assert_eq!(
            client.fetch_state("unknown").await.unwrap_err(),
            EngineError::NotFound("unknown".to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_handshake_is_bounded() {
        // accepts TCP connections and never answers the upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client = HttpSpecEngineClient::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), client.open_event_stream("t"))
            .await
            .expect("stream open must not hang on a silent upstream");

        match result {
            Err(EngineError::Unavailable(reason)) => assert!(reason.contains("handshake"), "{reason}"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("handshake unexpectedly succeeded"),
        }
        held.abort();
    }

    #[test]
    fn test_urls_keep_base_path() {
        let client = HttpSpecEngineClient::new("https://engine.internal/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint(&["state", "a b"]).unwrap().as_str(),
            "https://engine.internal/api/state/a%20b"
        );
        assert_eq!(
            client.stream_url("t-1").unwrap().as_str(),
            "wss://engine.internal/api/stream/t-1"
        );
    }
}
