use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::connection_manager::ConnectionId;
use crate::error::ErrorCode;
use crate::services::{
    Contact, ContactView, Conversation, ConversationSummary, FileAttachment, Message,
    MessageType, MessageWithAttachments, ParticipantView, User, UserSearchResult, UserStatus,
};

/// Raw inbound frame: `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    pub kind: String,
    pub data: Value,
}

impl InboundEnvelope {
    /// Decode a text frame. A missing `data` is treated as an empty object; any
    /// other shape problem is reported as a reason string.
    pub fn decode(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| format!("Invalid JSON: {}", e))?;

        let Value::Object(mut fields) = value else {
            return Err("Message must be a JSON object".to_string());
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err("Field 'type' must be a string".to_string()),
            None => return Err("Missing field 'type'".to_string()),
        };

        let data = match fields.remove("data") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data @ Value::Object(_)) => data,
            Some(_) => return Err("Field 'data' must be an object".to_string()),
        };

        Ok(Self { kind, data })
    }
}

/// The closed set of request kinds a client may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Authenticate,
    Logout,
    SendMessage,
    EditMessage,
    DeleteMessage,
    MarkAsRead,
    JoinConversation,
    LeaveConversation,
    CreateGroup,
    CreateDirectChat,
    AddParticipants,
    RemoveParticipant,
    TypingStart,
    TypingStop,
    UpdateStatus,
    GetConversations,
    GetMessages,
    GetParticipants,
    SendContactRequest,
    AcceptContactRequest,
    DeclineContactRequest,
    RemoveContact,
    BlockUser,
    UnblockUser,
    GetContacts,
    GetPendingRequests,
    GetBlockedUsers,
    SearchUsers,
}

impl RequestKind {
    pub fn parse(kind: &str) -> Option<Self> {
        let kind = match kind {
            "authenticate" | "auth" => Self::Authenticate,
            "logout" => Self::Logout,
            "send_message" => Self::SendMessage,
            "edit_message" => Self::EditMessage,
            "delete_message" => Self::DeleteMessage,
            "mark_as_read" => Self::MarkAsRead,
            "join_conversation" => Self::JoinConversation,
            "leave_conversation" => Self::LeaveConversation,
            "create_group" => Self::CreateGroup,
            "create_direct_chat" => Self::CreateDirectChat,
            "add_participants" => Self::AddParticipants,
            "remove_participant" => Self::RemoveParticipant,
            "typing_start" => Self::TypingStart,
            "typing_stop" => Self::TypingStop,
            "update_status" => Self::UpdateStatus,
            "get_conversations" => Self::GetConversations,
            "get_messages" => Self::GetMessages,
            "get_participants" => Self::GetParticipants,
            "send_contact_request" => Self::SendContactRequest,
            "accept_contact_request" => Self::AcceptContactRequest,
            "decline_contact_request" => Self::DeclineContactRequest,
            "remove_contact" => Self::RemoveContact,
            "block_user" => Self::BlockUser,
            "unblock_user" => Self::UnblockUser,
            "get_contacts" => Self::GetContacts,
            "get_pending_requests" => Self::GetPendingRequests,
            "get_blocked_users" => Self::GetBlockedUsers,
            "search_users" => Self::SearchUsers,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Logout => "logout",
            Self::SendMessage => "send_message",
            Self::EditMessage => "edit_message",
            Self::DeleteMessage => "delete_message",
            Self::MarkAsRead => "mark_as_read",
            Self::JoinConversation => "join_conversation",
            Self::LeaveConversation => "leave_conversation",
            Self::CreateGroup => "create_group",
            Self::CreateDirectChat => "create_direct_chat",
            Self::AddParticipants => "add_participants",
            Self::RemoveParticipant => "remove_participant",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::UpdateStatus => "update_status",
            Self::GetConversations => "get_conversations",
            Self::GetMessages => "get_messages",
            Self::GetParticipants => "get_participants",
            Self::SendContactRequest => "send_contact_request",
            Self::AcceptContactRequest => "accept_contact_request",
            Self::DeclineContactRequest => "decline_contact_request",
            Self::RemoveContact => "remove_contact",
            Self::BlockUser => "block_user",
            Self::UnblockUser => "unblock_user",
            Self::GetContacts => "get_contacts",
            Self::GetPendingRequests => "get_pending_requests",
            Self::GetBlockedUsers => "get_blocked_users",
            Self::SearchUsers => "search_users",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatePayload {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessagePayload {
    pub conversation_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditMessagePayload {
    pub message_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkAsReadPayload {
    pub conversation_id: String,
    pub message_id: String,
}

/// Any request addressed to one conversation
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRef {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

/// Any request addressed to one other user
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddParticipantsPayload {
    pub conversation_id: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveParticipantPayload {
    pub conversation_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusPayload {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMessagesPayload {
    pub conversation_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactRef {
    pub contact_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveContactPayload {
    pub contact_user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchUsersPayload {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A decoded and validated client request, one variant per [`RequestKind`]
#[derive(Debug, Clone)]
pub enum ClientRequest {
    Authenticate(AuthenticatePayload),
    Logout,
    SendMessage(SendMessagePayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(MessageRef),
    MarkAsRead(MarkAsReadPayload),
    JoinConversation(ConversationRef),
    LeaveConversation(ConversationRef),
    CreateGroup(CreateGroupPayload),
    CreateDirectChat(UserRef),
    AddParticipants(AddParticipantsPayload),
    RemoveParticipant(RemoveParticipantPayload),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    UpdateStatus(UpdateStatusPayload),
    GetConversations,
    GetMessages(GetMessagesPayload),
    GetParticipants(ConversationRef),
    SendContactRequest(UserRef),
    AcceptContactRequest(ContactRef),
    DeclineContactRequest(ContactRef),
    RemoveContact(RemoveContactPayload),
    BlockUser(UserRef),
    UnblockUser(UserRef),
    GetContacts,
    GetPendingRequests,
    GetBlockedUsers,
    SearchUsers(SearchUsersPayload),
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, String> {
    serde_json::from_value(data).map_err(|e| e.to_string())
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("Field '{}' must not be empty", field));
    }
    Ok(())
}

fn content(value: &str, limits: &ChatConfig) -> Result<(), String> {
    require("content", value)?;
    let length = value.chars().count();
    if length > limits.max_message_length {
        return Err(format!(
            "Field 'content' exceeds {} characters",
            limits.max_message_length
        ));
    }
    Ok(())
}

impl ClientRequest {
    /// Decode `data` against the schema of `kind` and check field constraints
    pub fn parse(kind: RequestKind, data: Value, limits: &ChatConfig) -> Result<Self, String> {
        let request = match kind {
            RequestKind::Authenticate => Self::Authenticate(payload(data)?),
            RequestKind::Logout => Self::Logout,
            RequestKind::SendMessage => Self::SendMessage(payload(data)?),
            RequestKind::EditMessage => Self::EditMessage(payload(data)?),
            RequestKind::DeleteMessage => Self::DeleteMessage(payload(data)?),
            RequestKind::MarkAsRead => Self::MarkAsRead(payload(data)?),
            RequestKind::JoinConversation => Self::JoinConversation(payload(data)?),
            RequestKind::LeaveConversation => Self::LeaveConversation(payload(data)?),
            RequestKind::CreateGroup => Self::CreateGroup(payload(data)?),
            RequestKind::CreateDirectChat => Self::CreateDirectChat(payload(data)?),
            RequestKind::AddParticipants => Self::AddParticipants(payload(data)?),
            RequestKind::RemoveParticipant => Self::RemoveParticipant(payload(data)?),
            RequestKind::TypingStart => Self::TypingStart(payload(data)?),
            RequestKind::TypingStop => Self::TypingStop(payload(data)?),
            RequestKind::UpdateStatus => Self::UpdateStatus(payload(data)?),
            RequestKind::GetConversations => Self::GetConversations,
            RequestKind::GetMessages => Self::GetMessages(payload(data)?),
            RequestKind::GetParticipants => Self::GetParticipants(payload(data)?),
            RequestKind::SendContactRequest => Self::SendContactRequest(payload(data)?),
            RequestKind::AcceptContactRequest => Self::AcceptContactRequest(payload(data)?),
            RequestKind::DeclineContactRequest => Self::DeclineContactRequest(payload(data)?),
            RequestKind::RemoveContact => Self::RemoveContact(payload(data)?),
            RequestKind::BlockUser => Self::BlockUser(payload(data)?),
            RequestKind::UnblockUser => Self::UnblockUser(payload(data)?),
            RequestKind::GetContacts => Self::GetContacts,
            RequestKind::GetPendingRequests => Self::GetPendingRequests,
            RequestKind::GetBlockedUsers => Self::GetBlockedUsers,
            RequestKind::SearchUsers => Self::SearchUsers(payload(data)?),
        };
        request.validate(limits)?;
        Ok(request)
    }

    fn validate(&self, limits: &ChatConfig) -> Result<(), String> {
        match self {
            Self::Authenticate(p) => require("token", &p.token),
            Self::SendMessage(p) => {
                require("conversation_id", &p.conversation_id)?;
                content(&p.content, limits)
            }
            Self::EditMessage(p) => {
                require("message_id", &p.message_id)?;
                content(&p.content, limits)
            }
            Self::DeleteMessage(p) => require("message_id", &p.message_id),
            Self::MarkAsRead(p) => {
                require("conversation_id", &p.conversation_id)?;
                require("message_id", &p.message_id)
            }
            Self::JoinConversation(p)
            | Self::LeaveConversation(p)
            | Self::TypingStart(p)
            | Self::TypingStop(p)
            | Self::GetParticipants(p) => require("conversation_id", &p.conversation_id),
            Self::CreateGroup(p) => require("name", &p.name),
            Self::CreateDirectChat(p)
            | Self::SendContactRequest(p)
            | Self::BlockUser(p)
            | Self::UnblockUser(p) => require("user_id", &p.user_id),
            Self::AddParticipants(p) => {
                require("conversation_id", &p.conversation_id)?;
                if p.user_ids.is_empty() {
                    return Err("Field 'user_ids' must not be empty".to_string());
                }
                Ok(())
            }
            Self::RemoveParticipant(p) => {
                require("conversation_id", &p.conversation_id)?;
                require("user_id", &p.user_id)
            }
            Self::UpdateStatus(p) => match p.status {
                UserStatus::Offline => {
                    Err("Field 'status' must be one of online, away, busy".to_string())
                }
                _ => Ok(()),
            },
            Self::GetMessages(p) => require("conversation_id", &p.conversation_id),
            Self::AcceptContactRequest(p) | Self::DeclineContactRequest(p) => {
                require("contact_id", &p.contact_id)
            }
            Self::RemoveContact(p) => require("contact_user_id", &p.contact_user_id),
            Self::SearchUsers(p) => require("query", &p.query),
            Self::Logout
            | Self::GetConversations
            | Self::GetContacts
            | Self::GetPendingRequests
            | Self::GetBlockedUsers => Ok(()),
        }
    }
}

/// Events sent from server to client, serialized as `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthSuccess {
        user: User,
        connection_id: ConnectionId,
    },
    LogoutSuccess {},
    NewMessage {
        message: Message,
        sender: User,
        attachments: Vec<FileAttachment>,
    },
    MessageEdited {
        message_id: String,
        conversation_id: String,
        content: Option<String>,
        edited_at: Option<chrono::DateTime<Utc>>,
    },
    MessageDeleted {
        message_id: String,
        conversation_id: String,
        deleted_at: Option<chrono::DateTime<Utc>>,
    },
    MessagesMarkedRead {
        conversation_id: String,
        message_id: String,
    },
    ConversationJoined {
        conversation_id: String,
    },
    ConversationLeft {
        conversation_id: String,
    },
    GroupCreated {
        conversation: Conversation,
        participants: Vec<ParticipantView>,
    },
    GroupInvitation {
        conversation: Conversation,
        invited_by: User,
    },
    DirectChatCreated {
        conversation: Conversation,
        other_user: Option<User>,
    },
    ParticipantsAdded {
        conversation_id: String,
        user_ids: Vec<String>,
        added_by: String,
    },
    ParticipantRemoved {
        conversation_id: String,
        user_id: String,
        removed_by: String,
    },
    RemovedFromConversation {
        conversation_id: String,
        removed_by: String,
    },
    TypingStarted {
        conversation_id: String,
        user_id: String,
        username: String,
    },
    TypingStopped {
        conversation_id: String,
        user_id: String,
    },
    StatusUpdated {
        user_id: String,
        status: UserStatus,
    },
    ConversationsList {
        conversations: Vec<ConversationSummary>,
    },
    MessagesList {
        conversation_id: String,
        messages: Vec<MessageWithAttachments>,
        limit: usize,
        offset: usize,
    },
    ParticipantsList {
        conversation_id: String,
        participants: Vec<ParticipantView>,
    },
    ContactsList {
        contacts: Vec<ContactView>,
    },
    PendingRequests {
        incoming: Vec<ContactView>,
        outgoing: Vec<ContactView>,
    },
    BlockedUsersList {
        blocked_users: Vec<ContactView>,
    },
    ContactRequestSent {
        contact: Contact,
        target_user: Option<User>,
    },
    ContactRequestReceived {
        contact: Contact,
        from_user: User,
    },
    ContactRequestAccepted {
        contact_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        contact_user: Option<User>,
        #[serde(skip_serializing_if = "Option::is_none")]
        accepted_by: Option<User>,
    },
    ContactRequestDeclined {
        contact_id: String,
    },
    ContactRemoved {
        user_id: String,
    },
    UserBlocked {
        user_id: String,
    },
    UserUnblocked {
        user_id: String,
    },
    UsersSearchResults {
        query: String,
        users: Vec<UserSearchResult>,
    },
    Error {
        code: ErrorCode,
        message: String,
        details: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn error_with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Error {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

/// Outbound frame: the event plus a timestamp and a unique message id
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: String,
    pub message_id: Uuid,
}

impl OutboundEnvelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message_id: Uuid::new_v4(),
        }
    }

    /// Serialize once; the same frame is handed to every recipient of a fan-out.
    /// `None` when the event cannot be serialized, in which case nothing is sent.
    pub fn to_frame(&self) -> Option<String> {
        encode_frame(self)
    }
}

fn encode_frame<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound envelope");
            None
        }
    }
}

impl From<ServerEvent> for OutboundEnvelope {
    fn from(event: ServerEvent) -> Self {
        Self::new(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_defaults_missing_data() {
        let envelope = InboundEnvelope::decode(r#"{"type":"get_contacts"}"#).unwrap();
        assert_eq!(envelope.kind, "get_contacts");
        assert_eq!(envelope.data, json!({}));
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(InboundEnvelope::decode("not json").is_err());
        assert!(InboundEnvelope::decode("[1,2]").is_err());
        assert!(InboundEnvelope::decode(r#"{"data":{}}"#).is_err());
        assert!(InboundEnvelope::decode(r#"{"type":5,"data":{}}"#).is_err());
        assert!(InboundEnvelope::decode(r#"{"type":"logout","data":[]}"#).is_err());
    }

    #[test]
    fn test_request_kind_table() {
        assert_eq!(RequestKind::parse("auth"), Some(RequestKind::Authenticate));
        assert_eq!(RequestKind::parse("search_users"), Some(RequestKind::SearchUsers));
        assert_eq!(RequestKind::parse("subscribe"), None);
        assert_eq!(RequestKind::SendMessage.as_str(), "send_message");
    }

    #[test]
    fn test_send_message_defaults_and_limits() {
        let limits = ChatConfig::default();
        let request = ClientRequest::parse(
            RequestKind::SendMessage,
            json!({"conversation_id": "c1", "content": "hi"}),
            &limits,
        )
        .unwrap();
        match request {
            ClientRequest::SendMessage(p) => {
                assert_eq!(p.message_type, MessageType::Text);
                assert!(p.reply_to_id.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let too_long = "x".repeat(limits.max_message_length + 1);
        let err = ClientRequest::parse(
            RequestKind::SendMessage,
            json!({"conversation_id": "c1", "content": too_long}),
            &limits,
        )
        .unwrap_err();
        assert!(err.contains("content"));
    }

    #[test]
    fn test_missing_field_reports_reason() {
        let err = ClientRequest::parse(RequestKind::EditMessage, json!({"content": "x"}), &ChatConfig::default())
            .unwrap_err();
        assert!(err.contains("message_id"));
    }

    #[test]
    fn test_update_status_refuses_offline() {
        let limits = ChatConfig::default();
        assert!(ClientRequest::parse(RequestKind::UpdateStatus, json!({"status": "busy"}), &limits).is_ok());
        assert!(ClientRequest::parse(RequestKind::UpdateStatus, json!({"status": "offline"}), &limits).is_err());
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = OutboundEnvelope::new(ServerEvent::ConversationJoined {
            conversation_id: "c1".to_string(),
        });
        let value: Value = serde_json::from_str(&envelope.to_frame().unwrap()).unwrap();

        assert_eq!(value["type"], "conversation_joined");
        assert_eq!(value["data"]["conversation_id"], "c1");
        assert!(value["timestamp"].is_string());
        assert!(Uuid::parse_str(value["message_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_empty_event_has_object_data() {
        let frame = OutboundEnvelope::new(ServerEvent::LogoutSuccess {})
            .to_frame()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "logout_success");
        assert_eq!(value["data"], json!({}));
    }

    #[test]
    fn test_error_event_serializes_code() {
        let frame = OutboundEnvelope::new(ServerEvent::error_with_details(
            ErrorCode::InvalidMessageFormat,
            "Invalid message data",
            "missing field `token`",
        ))
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["data"]["code"], "INVALID_MESSAGE_FORMAT");
        assert_eq!(value["data"]["details"], "missing field `token`");
    }

    #[test]
    fn test_unserializable_frame_is_dropped() {
        // JSON object keys must be strings
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), "value");
        assert!(encode_frame(&bad).is_none());
    }
}
