// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stream Bridge
//!
//! Relays a spec engine event stream to an authenticated WebSocket client.
//!
//! ```text
//! engine /stream/{thread_id} ──► relay loop ──► client socket
//!                                   ▲
//!         client watcher ───────────┘ (shared CancellationToken)
//! ```
//!
//! The upstream stream is opened before the upgrade is accepted, so a dead
//! engine surfaces as a 502 instead of an empty socket. Frames are forwarded
//! verbatim and in order. The session ends when:
//!
//! | Trigger | Client close code |
//! |---------|-------------------|
//! | terminal `end` event (forwarded first) | 1000 |
//! | upstream closed cleanly | 1000 |
//! | upstream error | 1011 |
//! | no upstream frame within the read deadline | 1011 |
//! | client disconnects | (none; upstream dropped) |

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::identity::Caller;
use crate::domain::spec_engine::EngineEventStream;
use crate::presentation::api::{ApiError, AppState};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RelayOutcome {
    Terminal,
    UpstreamClosed,
    UpstreamError(String),
    Stalled,
    ClientGone,
}

impl RelayOutcome {
    fn close_frame(&self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            RelayOutcome::Terminal => (close_code::NORMAL, "stream complete"),
            RelayOutcome::UpstreamClosed => (close_code::NORMAL, "upstream closed"),
            RelayOutcome::UpstreamError(_) => (close_code::ERROR, "upstream error"),
            RelayOutcome::Stalled => (close_code::ERROR, "upstream read timed out"),
            RelayOutcome::ClientGone => return None,
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

pub async fn stream_refinement_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(thread_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    state.orchestration.authorize_stream(&caller, &thread_id).await?;

    let upstream = state.engine.open_event_stream(&thread_id).await.map_err(|e| {
        warn!(thread_id = %thread_id, error = %e, "Could not open upstream event stream");
        ApiError::BadGateway("Spec engine stream unavailable".to_string())
    })?;

    metrics::counter!("gateway_stream_sessions_total").increment(1);
    info!(thread_id = %thread_id, subject_id = %caller.subject_id, "Stream session starting");

    let read_timeout = state.stream_read_timeout;
    Ok(ws.on_upgrade(move |socket| bridge(socket, upstream, read_timeout, thread_id)))
}

async fn bridge(socket: WebSocket, upstream: EngineEventStream, read_timeout: Duration, thread_id: String) {
    let (mut client_tx, mut client_rx) = socket.split();
    let cancel = CancellationToken::new();

    let watcher_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = watcher_cancel.cancelled() => break,
                frame = client_rx.next() => match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // relay is one-directional; other client frames are ignored
                    Some(Ok(_)) => {}
                },
            }
        }
        watcher_cancel.cancel();
    });

    let outcome = relay(&mut client_tx, upstream, read_timeout, &cancel).await;

    if let Some(frame) = outcome.close_frame() {
        if let Err(e) = client_tx.send(Message::Close(Some(frame))).await {
            debug!(thread_id = %thread_id, error = %e, "Client already gone when closing");
        }
    }
    cancel.cancel();
    let _ = watcher.await;

    match &outcome {
        RelayOutcome::UpstreamError(e) => warn!(thread_id = %thread_id, error = %e, "Stream session ended by upstream error"),
        RelayOutcome::Stalled => warn!(thread_id = %thread_id, ?read_timeout, "Stream session ended: upstream stalled"),
        other => info!(thread_id = %thread_id, outcome = ?other, "Stream session ended"),
    }
}

/// Forward upstream events until one side finishes. Consumes `upstream`, so
/// the engine socket is released when this returns.
async fn relay(
    client_tx: &mut SplitSink<WebSocket, Message>,
    mut upstream: EngineEventStream,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> RelayOutcome {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return RelayOutcome::ClientGone,
            next = tokio::time::timeout(read_timeout, upstream.next()) => next,
        };

        let event = match next {
            Err(_) => return RelayOutcome::Stalled,
            Ok(None) => return RelayOutcome::UpstreamClosed,
            Ok(Some(Err(e))) => return RelayOutcome::UpstreamError(e.to_string()),
            Ok(Some(Ok(event))) => event,
        };

        if client_tx.send(Message::Text(event.raw().to_string().into())).await.is_err() {
            return RelayOutcome::ClientGone;
        }
        if event.is_terminal() {
            return RelayOutcome::Terminal;
        }
    }
}
