//! HTTP and WebSocket routes.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Json},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::engine::ExecutionEngine;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::session::ClientSession;

/// Application state shared across handlers.
pub struct AppState {
    /// Execution coordinator.
    pub engine: Arc<ExecutionEngine>,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (session, mut outbox) = state.engine.sessions().register();
    tracing::info!(session = session.id(), "client connected");

    // Writer task: drains the session outbox onto the socket and resolves
    // each frame's delivery acknowledgement after the write.
    let writer_task = tokio::spawn(async move {
        while let Some(outbound) = outbox.recv().await {
            let Ok(json) = serde_json::to_string(&outbound.frame) else {
                continue;
            };
            let wrote = sender.send(Message::Text(json.into())).await.is_ok();
            if let Some(delivered) = outbound.delivered {
                let _ = delivered.send(wrote);
            }
            if !wrote {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_client_frame(frame, &state, &session),
                Err(e) => {
                    // A malformed frame closes this connection; it never
                    // takes the process down.
                    tracing::warn!(session = session.id(), "malformed frame: {}", e);
                    session.send(ServerFrame::Error {
                        id: None,
                        message: format!("malformed frame: {}", e),
                    });
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(session = session.id(), "WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    state.engine.sessions().remove(session.id());
    tracing::info!(session = session.id(), "client disconnected");
    writer_task.abort();
}

/// Dispatch one client frame.
fn handle_client_frame(frame: ClientFrame, state: &Arc<AppState>, session: &Arc<ClientSession>) {
    match frame {
        ClientFrame::Ping { id } => {
            session.send(ServerFrame::Reply {
                id,
                result: json!("pong"),
            });
        }

        ClientFrame::ExecuteCell {
            id,
            path,
            cell_id,
            language,
            code,
        } => match state.engine.execute_cell(&path, &cell_id, &language, &code) {
            Ok(()) => {
                session.send(ServerFrame::Reply {
                    id,
                    result: serde_json::Value::Null,
                });
            }
            Err(e) => {
                session.send(ServerFrame::Error {
                    id: Some(id),
                    message: e.to_string(),
                });
            }
        },
    }
}
