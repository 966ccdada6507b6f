//! `GET /api/v1/ws/{session_id}`: the chat pipeline over a WebSocket.
//!
//! Every text frame is answered with `typing{true}`, then `chat_response` or
//! `error`, then `typing{false}`. A frame that is not a valid client message
//! gets a single `error` event and the socket stays open.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clarity_types::{ChatRequest, ErrorBody, WsClientMessage, WsServerEvent};
use tracing::{debug, info, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::middleware::CurrentUser;
use crate::services::AuthUser;
use crate::state::{AppState, Slot};

#[derive(OpenApi)]
#[openapi(paths(ws_handler), components(schemas(WsClientMessage, WsServerEvent)))]
pub struct WsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/{session_id}", get(ws_handler))
}

/// Upgrade to a chat socket. A new socket for the same session replaces the
/// previous one.
#[utoipa::path(
    get,
    path = "/api/v1/ws/{session_id}",
    tag = "chat",
    params(("session_id" = String, Path, description = "Chat session id")),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 503, description = "Too many open sockets", body = ErrorBody),
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Response {
    // Claim a place under the connection cap before upgrading.
    let Some(slot) = state.connections.try_reserve() else {
        warn!(session_id = %session_id, "websocket limit reached");
        return ServerError::ServiceUnavailable(format!(
            "too many WebSocket connections (max {})",
            state.config.max_ws_connections
        ))
        .into_response();
    };
    ws.on_upgrade(move |socket| ws_connection(socket, slot, session_id, user.0, state))
        .into_response()
}

async fn ws_connection(
    mut socket: WebSocket,
    slot: Slot,
    session_id: String,
    user: Option<AuthUser>,
    state: Arc<AppState>,
) {
    let conn = slot.register(&session_id);
    info!(session_id = %session_id, conn = conn.id(), "websocket connected");

    loop {
        tokio::select! {
            _ = conn.replaced.notified() => {
                debug!(session_id = %session_id, conn = conn.id(), "closing replaced websocket");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&mut socket, &state, &session_id, user.as_ref(), text.as_str()).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, error = %e, "websocket receive failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %session_id, conn = conn.id(), "websocket disconnected");
}

async fn handle_frame(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    user: Option<&AuthUser>,
    text: &str,
) -> Result<(), axum::Error> {
    let frame: WsClientMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "malformed websocket frame");
            let message = format!("Invalid message: {e}");
            return send_event(socket, &WsServerEvent::Error { message }).await;
        }
    };

    send_event(socket, &WsServerEvent::Typing { is_typing: true }).await?;

    let req = ChatRequest {
        content: frame.content,
        session_id: session_id.to_string(),
        context: frame.context,
    };
    let result = match req.validate() {
        Ok(()) => state.therapy.process_message(&req, user).await,
        Err(e) => Err(ServerError::from(e)),
    };
    let event = match result {
        Ok(data) => WsServerEvent::ChatResponse { data },
        Err(e) => {
            let (_, detail) = e.status_and_detail();
            WsServerEvent::Error {
                message: format!("Error processing message: {detail}"),
            }
        }
    };
    send_event(socket, &event).await?;

    send_event(socket, &WsServerEvent::Typing { is_typing: false }).await
}

async fn send_event(socket: &mut WebSocket, event: &WsServerEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to encode websocket event");
            Ok(())
        }
    }
}
