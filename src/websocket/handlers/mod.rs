//! One async handler per request kind.
//!
//! Every handler checks authentication itself through [`HandlerContext::require_auth`];
//! there is no connection-level gate in front of them.

mod chat;
mod contacts;
mod conversation;
mod session;

pub(crate) use chat::{
    delete_message, edit_message, get_messages, mark_as_read, send_message, typing,
};
pub(crate) use contacts::{
    accept_contact_request, block_user, decline_contact_request, get_blocked_users,
    get_contacts, get_pending_requests, remove_contact, search_users, send_contact_request,
    unblock_user,
};
pub(crate) use conversation::{
    add_participants, create_direct_chat, create_group, get_conversations, get_participants,
    join_conversation, leave_conversation, remove_participant,
};
pub(crate) use session::{authenticate, logout, update_status};

use thiserror::Error;

use crate::config::ChatConfig;
use crate::connection_manager::{ConnectionId, ConnectionManager};
use crate::error::{ErrorCode, ServiceError};
use crate::services::{Services, User};

use super::message::{OutboundEnvelope, ServerEvent};

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Refusal reported to the client as-is
    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },

    /// Collaborator fault, reported as `SERVER_ERROR`
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl HandlerError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }
}

pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Everything a handler may touch while serving one request
pub struct HandlerContext<'a> {
    pub connection_id: ConnectionId,
    pub connections: &'a ConnectionManager,
    pub services: &'a Services,
    pub limits: &'a ChatConfig,
}

impl HandlerContext<'_> {
    /// Resolve the connection's bound user or refuse the request
    pub async fn require_auth(&self) -> HandlerResult<User> {
        let identity = self.connections.identity(self.connection_id).ok_or_else(|| {
            HandlerError::rejected(ErrorCode::AuthenticationRequired, "Authentication required")
        })?;

        self.services
            .users
            .get_user(&identity.user_id)
            .await?
            .ok_or_else(|| HandlerError::rejected(ErrorCode::UserNotFound, "User not found"))
    }

    /// Send an event to the requesting connection
    pub fn reply(&self, event: ServerEvent) -> bool {
        let Some(frame) = OutboundEnvelope::new(event).to_frame() else {
            return false;
        };
        self.connections.send(self.connection_id, &frame)
    }

    pub fn to_user(&self, user_id: &str, event: ServerEvent) -> usize {
        let Some(frame) = OutboundEnvelope::new(event).to_frame() else {
            return 0;
        };
        self.connections.send_to_user(user_id, &frame)
    }

    pub fn to_room(&self, room: &str, event: ServerEvent, exclude_user_id: Option<&str>) -> usize {
        let Some(frame) = OutboundEnvelope::new(event).to_frame() else {
            return 0;
        };
        self.connections.send_to_room(room, &frame, exclude_user_id)
    }
}
