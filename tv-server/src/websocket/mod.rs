//! One-way progress streaming over WebSocket (spec.md §4.8).
//!
//! Grounded on `ferrex-server/src/handlers/handle_websocket.rs`'s upgrade + split-sink/stream
//! shape, simplified: upload jobs and parse sessions publish snapshots, clients only read, so
//! there is no inbound message loop to drive a sync protocol — just a forwarding task that ends
//! when the subscriber reaches a terminal snapshot or the socket closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tv_contracts::{SessionId, UploadJobId};
use tv_model::{ParseSession, UploadJob};

use crate::app_state::AppState;

pub async fn job_progress_ws(State(state): State<AppState>, Path(job_id): Path<UploadJobId>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let Some(subscriber) = state.uploads.subscribe(job_id).await else {
            return;
        };
        stream_snapshots(socket, subscriber, UploadJob::is_terminal).await;
    })
}

pub async fn session_progress_ws(State(state): State<AppState>, Path(session_id): Path<SessionId>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let Some(subscriber) = state.sessions.subscribe(session_id).await else {
            return;
        };
        stream_snapshots(socket, subscriber, is_session_terminal).await;
    })
}

fn is_session_terminal(session: &ParseSession) -> bool {
    matches!(session.status, tv_model::SessionStatus::Complete | tv_model::SessionStatus::Error)
}

/// Forwards every snapshot from `subscriber` to `socket` as a JSON text frame, starting with the
/// current value, until `is_terminal` matches, the socket errors, or the client closes.
async fn stream_snapshots<T>(socket: WebSocket, mut subscriber: tv_core::progress::ProgressSubscriber<T>, is_terminal: fn(&T) -> bool)
where
    T: Clone + Serialize + Send + 'static,
{
    let (mut sink, _stream) = socket.split();

    let current = subscriber.current();
    let done = is_terminal(&current);
    if send_snapshot(&mut sink, &current).await.is_err() {
        return;
    }
    if done {
        return;
    }

    loop {
        let Some(snapshot) = subscriber.changed().await else {
            break;
        };
        let done = is_terminal(&snapshot);
        if send_snapshot(&mut sink, &snapshot).await.is_err() {
            break;
        }
        if done {
            break;
        }
    }
}

async fn send_snapshot<T: Serialize>(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    snapshot: &T,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(snapshot).unwrap_or_else(|_| "null".to_string());
    sink.send(Message::Text(text.into())).await
}
