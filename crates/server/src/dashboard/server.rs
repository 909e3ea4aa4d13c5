//! axum web server for the live dashboard.
//!
//! JSON snapshots live under `/api`; `/ws` pushes metrics every 200 ms and
//! session lifecycle events as they happen.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use super::{LevelView, MetricsSnapshot, level_views};
use crate::net::ServerContext;
use crate::session::SessionInfo;

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/api/metrics", get(metrics))
        .route("/api/levels", get(levels))
        .route("/api/sessions", get(sessions))
        .route("/ws", get(ws_upgrade))
        .with_state(ctx)
}

/// Start the dashboard web server. Runs forever on its own tasks.
pub async fn start(ctx: Arc<ServerContext>, port: u16) {
    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Dashboard failed to bind to {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Dashboard listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router(ctx)).await {
        tracing::error!("Dashboard server error: {}", e);
    }
}

fn snapshot(ctx: &ServerContext) -> MetricsSnapshot {
    ctx.metrics.snapshot(ctx.authority.len() as u64)
}

async fn metrics(State(ctx): State<Arc<ServerContext>>) -> Json<MetricsSnapshot> {
    Json(snapshot(&ctx))
}

async fn levels(State(ctx): State<Arc<ServerContext>>) -> Json<Vec<LevelView>> {
    Json(level_views(&ctx.authority))
}

async fn sessions(State(ctx): State<Arc<ServerContext>>) -> Json<Vec<SessionInfo>> {
    Json(ctx.sessions.snapshot())
}

/// Upgrade an HTTP request to a WebSocket connection.
async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<Arc<ServerContext>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Push metrics and session events to a connected browser.
async fn handle_socket(mut socket: WebSocket, ctx: Arc<ServerContext>) {
    let mut session_rx = ctx.sessions.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let msg = serde_json::json!({
                    "type": "metrics",
                    "data": snapshot(&ctx),
                });
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }

            event = session_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    // Missed some; the next /api/sessions poll catches up.
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!("Dashboard socket lagged by {} session events", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let msg = serde_json::json!({
                    "type": "session",
                    "data": event,
                });
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }

            // Drain any incoming messages (ping/pong, close).
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), ()> {
    let text = value.to_string();
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}
