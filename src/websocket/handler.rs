use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::connection_manager::{ChannelTransport, ConnectionId, OutboundFrame};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Connections always open anonymous. A token in the query string or an
/// `Authorization: Bearer` header is tried once the socket is up; a refused token
/// leaves the connection open so the client can still send `authenticate`.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(&query, &headers);
    let max_payload = state.settings.websocket.max_payload;

    ws.max_message_size(max_payload)
        .max_frame_size(max_payload)
        .on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Drive one socket: register, pump frames both ways, remove on close
async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let connection_start = std::time::Instant::now();
    let ws_config = state.settings.websocket.clone();

    let (transport, rx) = ChannelTransport::channel(ws_config.send_buffer);
    let connection_id = state.connection_manager.register(Arc::new(transport));

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    if let Some(token) = token {
        if !state
            .connection_manager
            .authenticate(connection_id, &token)
            .await
        {
            tracing::debug!(connection_id = %connection_id, "Token on upgrade refused");
        }
    }

    let (ws_sender, mut ws_receiver) = socket.split();

    // Task for draining the connection's outbound channel into the socket
    let heartbeat = ws_config.heartbeat_interval();
    let mut send_task = tokio::spawn(write_outbound(rx, ws_sender, heartbeat));

    // Task for receiving frames, closing after the idle timeout
    let recv_state = state.clone();
    let idle_timeout = ws_config.idle_timeout();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let next = match tokio::time::timeout(idle_timeout, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!(connection_id = %connection_id, "Idle timeout reached");
                    break;
                }
            };

            match next {
                Some(Ok(msg)) => {
                    if !process_message(msg, &recv_state, connection_id).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.connection_manager.remove(connection_id, None).await;

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Write queued frames to the socket until the channel closes or a close frame is
/// sent. A ping goes out every `heartbeat` so a quiet client's pongs keep it inside
/// the idle timeout.
async fn write_outbound<S>(mut rx: mpsc::Receiver<OutboundFrame>, mut sink: S, heartbeat: Duration)
where
    S: Sink<Message> + Unpin,
{
    let mut heartbeat_timer = tokio::time::interval(heartbeat);

    // Skip immediate first tick
    heartbeat_timer.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Close(code)) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Utf8Bytes::from_static(""),
                        })))
                        .await;
                    break;
                }
                None => break,
            },
            _ = heartbeat_timer.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, connection_id: ConnectionId) -> bool {
    match msg {
        Message::Text(text) => {
            state.connection_manager.record_activity(connection_id);
            state.dispatcher.handle_text(connection_id, text.as_str()).await;
            true
        }
        Message::Binary(bytes) => {
            state.connection_manager.record_activity(connection_id);
            state.dispatcher.handle_bytes(connection_id, &bytes).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // axum answers pings itself
            state.connection_manager.record_activity(connection_id);
            true
        }
        Message::Close(frame) => {
            tracing::debug!(
                connection_id = %connection_id,
                code = ?frame.as_ref().map(|f| f.code),
                "Received close frame"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_query_token_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        let query = WsQuery {
            token: Some("query-token".to_string()),
        };
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("query-token"));
    }

    #[test]
    fn test_bearer_header_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let query = WsQuery { token: None };
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&query, &headers).is_none());
    }

    #[tokio::test]
    async fn test_writer_pings_quiet_connection() {
        let (tx, rx) = mpsc::channel(4);
        let (sink, mut socket) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_outbound(rx, sink, Duration::from_millis(50)));

        let first = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Should ping before the timeout")
            .expect("Socket should stay open");
        assert!(matches!(first, Message::Ping(_)));

        tx.send(OutboundFrame::Close(1000)).await.unwrap();
        let mut closed = false;
        while let Some(msg) = socket.next().await {
            if let Message::Close(Some(frame)) = msg {
                assert_eq!(frame.code, 1000);
                closed = true;
            }
        }
        assert!(closed);
        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("Writer should stop after close")
            .unwrap();
    }
}
