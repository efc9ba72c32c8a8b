//! Live event stream over WebSocket.
//!
//! `GET /api/live` upgrades and forwards every broadcast event as one JSON
//! text frame; `?sensor=<id>` narrows the stream to that sensor's channel.
//! A client that falls behind its bounded buffer silently loses the oldest
//! events (the broadcaster never waits for slow consumers), and a client
//! that disconnects just drops its receiver.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::{routing::get, Router};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/live", get(live))
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    /// Internal sensor id to filter on; omit for the global stream.
    sensor: Option<i64>,
}

/// Handle `GET /api/live`.
async fn live(
    ws: WebSocketUpgrade,
    Query(params): Query<LiveQuery>,
    State(state): State<AppState>,
) -> Response {
    // ---
    ws.on_upgrade(move |socket| stream_events(socket, state, params.sensor))
}

async fn stream_events(mut socket: WebSocket, state: AppState, sensor: Option<i64>) {
    // ---
    let mut rx = match sensor {
        Some(id) => state.broadcaster.subscribe_sensor(id),
        None => state.broadcaster.subscribe(),
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Live subscriber lagged; {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Clients do not speak on this socket; drain pings and
                // ignore anything else until the connection goes away.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
