use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use typetype_shared::protocol::{ClientMsg, ServerMsg};

use crate::config::ServerConfig;
use crate::lobby::LobbyCommand;
use crate::player::ConnectionId;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
    pub next_connection_id: Arc<AtomicU32>,
    pub connection_semaphore: Arc<Semaphore>,
    pub max_message_bytes: usize,
    pub max_parse_errors: u32,
}

impl AppState {
    pub fn new(lobby_tx: mpsc::Sender<LobbyCommand>, config: &ServerConfig) -> Self {
        Self {
            lobby_tx,
            next_connection_id: Arc::new(AtomicU32::new(1)),
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            max_message_bytes: config.max_message_bytes,
            max_parse_errors: config.max_parse_errors,
        }
    }
}

/// `/ws` and `/health` with CORS for `allowed_origins` (permissive when empty).
pub fn router(app_state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors_layer(allowed_origins))
        .with_state(app_state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": iso_timestamp(chrono::Utc::now()),
    }))
}

/// `2024-05-01T12:00:00.123Z`
pub fn iso_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let permit = match app_state.connection_semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Connection limit reached, rejecting upgrade");
            return (StatusCode::SERVICE_UNAVAILABLE, "Server full").into_response();
        }
    };

    // Frames past 8x the limit fail in the codec; smaller oversized ones are closed below
    ws.max_message_size(app_state.max_message_bytes.saturating_mul(8))
        .on_upgrade(move |socket| handle_socket(socket, app_state, permit))
        .into_response()
}

async fn close_with(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &'static str,
) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(socket: WebSocket, app_state: AppState, _permit: OwnedSemaphorePermit) {
    let conn = ConnectionId(app_state.next_connection_id.fetch_add(1, Ordering::Relaxed));
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMsg>();
    let mut parse_errors: u32 = 0;

    tracing::info!("Connection {} opened", conn);

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > app_state.max_message_bytes {
                            tracing::warn!(
                                "Connection {} sent {} bytes, closing",
                                conn,
                                text.len()
                            );
                            close_with(&mut sink, close_code::SIZE, "Message too large").await;
                            break;
                        }

                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(msg) => {
                                let cmd = LobbyCommand::Client {
                                    conn,
                                    outbox: outbox.clone(),
                                    msg,
                                };
                                if app_state.lobby_tx.send(cmd).await.is_err() {
                                    tracing::error!("Lobby stopped, dropping connection {}", conn);
                                    break;
                                }
                            }
                            Err(e) => {
                                parse_errors += 1;
                                tracing::debug!("Connection {} sent bad message: {}", conn, e);
                                if parse_errors > app_state.max_parse_errors {
                                    tracing::warn!("Connection {} exceeded parse error limit", conn);
                                    close_with(&mut sink, close_code::POLICY, "Too many invalid messages").await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Connection {} read error: {}", conn, e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client
            Some(msg) = outbox_rx.recv() => {
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize message: {}", e),
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .lobby_tx
        .send(LobbyCommand::Disconnect { conn })
        .await;
    tracing::info!("Connection {} closed", conn);
}
