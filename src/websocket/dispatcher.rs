use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::config::ChatConfig;
use crate::connection_manager::{ConnectionId, ConnectionManager};
use crate::error::ErrorCode;
use crate::metrics::DispatchMetrics;
use crate::services::Services;

use super::handlers::{self, HandlerContext, HandlerError, HandlerResult};
use super::message::{ClientRequest, InboundEnvelope, OutboundEnvelope, RequestKind, ServerEvent};

/// Decodes inbound frames, validates them against their kind and routes them to
/// exactly one handler.
///
/// Protocol errors never reach a handler and never touch the registry. Handler
/// failures, including panics, become `SERVER_ERROR` replies; the connection
/// stays open either way.
pub struct MessageDispatcher {
    connections: Arc<ConnectionManager>,
    services: Services,
    limits: ChatConfig,
}

impl MessageDispatcher {
    pub fn new(connections: Arc<ConnectionManager>, services: Services, limits: ChatConfig) -> Self {
        Self {
            connections,
            services,
            limits,
        }
    }

    /// Entry point for binary frames: they must carry UTF-8 JSON like text frames
    pub async fn handle_bytes(&self, connection_id: ConnectionId, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_text(connection_id, text).await,
            Err(e) => self.send_error(
                connection_id,
                ServerEvent::error_with_details(
                    ErrorCode::InvalidMessageFormat,
                    "Invalid message format",
                    e.to_string(),
                ),
            ),
        }
    }

    #[tracing::instrument(name = "ws.dispatch", skip(self, raw), fields(connection_id = %connection_id))]
    pub async fn handle_text(&self, connection_id: ConnectionId, raw: &str) {
        let envelope = match InboundEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(reason) => {
                tracing::debug!(reason = %reason, "Rejected malformed frame");
                self.send_error(
                    connection_id,
                    ServerEvent::error_with_details(
                        ErrorCode::InvalidMessageFormat,
                        "Invalid message format",
                        reason,
                    ),
                );
                return;
            }
        };

        let Some(kind) = RequestKind::parse(&envelope.kind) else {
            self.send_error(
                connection_id,
                ServerEvent::error(
                    ErrorCode::UnknownMessageType,
                    format!("Unknown message type: {}", envelope.kind),
                ),
            );
            return;
        };

        let request = match ClientRequest::parse(kind, envelope.data, &self.limits) {
            Ok(request) => request,
            Err(reason) => {
                self.send_error(
                    connection_id,
                    ServerEvent::error_with_details(
                        ErrorCode::InvalidMessageFormat,
                        "Invalid message data",
                        reason,
                    ),
                );
                return;
            }
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.dispatch(connection_id, request))
            .catch_unwind()
            .await;
        DispatchMetrics::record_request(kind.as_str(), started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(HandlerError::Rejected { code, message })) => {
                tracing::debug!(kind = kind.as_str(), code = %code, "Request refused");
                self.send_error(connection_id, ServerEvent::error(code, message));
            }
            Ok(Err(HandlerError::Service(e))) => {
                tracing::error!(kind = kind.as_str(), error = %e, "Handler failed");
                self.send_error(
                    connection_id,
                    ServerEvent::error(ErrorCode::ServerError, "Internal server error"),
                );
            }
            Err(_) => {
                tracing::error!(kind = kind.as_str(), "Handler panicked");
                self.send_error(
                    connection_id,
                    ServerEvent::error(ErrorCode::ServerError, "Internal server error"),
                );
            }
        }
    }

    /// Route a validated request to its handler
    pub async fn dispatch(&self, connection_id: ConnectionId, request: ClientRequest) -> HandlerResult {
        let ctx = HandlerContext {
            connection_id,
            connections: &self.connections,
            services: &self.services,
            limits: &self.limits,
        };

        match request {
            ClientRequest::Authenticate(p) => handlers::authenticate(&ctx, p).await,
            ClientRequest::Logout => handlers::logout(&ctx).await,
            ClientRequest::SendMessage(p) => handlers::send_message(&ctx, p).await,
            ClientRequest::EditMessage(p) => handlers::edit_message(&ctx, p).await,
            ClientRequest::DeleteMessage(p) => handlers::delete_message(&ctx, p).await,
            ClientRequest::MarkAsRead(p) => handlers::mark_as_read(&ctx, p).await,
            ClientRequest::JoinConversation(p) => handlers::join_conversation(&ctx, p).await,
            ClientRequest::LeaveConversation(p) => handlers::leave_conversation(&ctx, p).await,
            ClientRequest::CreateGroup(p) => handlers::create_group(&ctx, p).await,
            ClientRequest::CreateDirectChat(p) => handlers::create_direct_chat(&ctx, p).await,
            ClientRequest::AddParticipants(p) => handlers::add_participants(&ctx, p).await,
            ClientRequest::RemoveParticipant(p) => handlers::remove_participant(&ctx, p).await,
            ClientRequest::TypingStart(p) => handlers::typing(&ctx, p, true).await,
            ClientRequest::TypingStop(p) => handlers::typing(&ctx, p, false).await,
            ClientRequest::UpdateStatus(p) => handlers::update_status(&ctx, p).await,
            ClientRequest::GetConversations => handlers::get_conversations(&ctx).await,
            ClientRequest::GetMessages(p) => handlers::get_messages(&ctx, p).await,
            ClientRequest::GetParticipants(p) => handlers::get_participants(&ctx, p).await,
            ClientRequest::SendContactRequest(p) => handlers::send_contact_request(&ctx, p).await,
            ClientRequest::AcceptContactRequest(p) => {
                handlers::accept_contact_request(&ctx, p).await
            }
            ClientRequest::DeclineContactRequest(p) => {
                handlers::decline_contact_request(&ctx, p).await
            }
            ClientRequest::RemoveContact(p) => handlers::remove_contact(&ctx, p).await,
            ClientRequest::BlockUser(p) => handlers::block_user(&ctx, p).await,
            ClientRequest::UnblockUser(p) => handlers::unblock_user(&ctx, p).await,
            ClientRequest::GetContacts => handlers::get_contacts(&ctx).await,
            ClientRequest::GetPendingRequests => handlers::get_pending_requests(&ctx).await,
            ClientRequest::GetBlockedUsers => handlers::get_blocked_users(&ctx).await,
            ClientRequest::SearchUsers(p) => handlers::search_users(&ctx, p).await,
        }
    }

    fn send_error(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let ServerEvent::Error { code, .. } = &event {
            DispatchMetrics::record_error(code.as_str());
        }
        if let Some(frame) = OutboundEnvelope::new(event).to_frame() {
            self.connections.send(connection_id, &frame);
        }
    }
}
