//! Narrow contracts for the collaborators the hub depends on.
//!
//! Persistence, contact bookkeeping and file storage live behind these traits. A
//! `None` or `false` return is a domain refusal (not a participant, not the sender,
//! no such record) and is reported to the client as such; `Err(ServiceError)` is an
//! infrastructure fault and surfaces as `SERVER_ERROR`.

mod memory;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::Identity;
use crate::error::ServiceError;

pub use memory::InMemoryStore;
pub use models::{
    Contact, ContactStatus, ContactView, Conversation, ConversationSummary, ConversationType,
    FileAttachment, Message, MessageType, MessageWithAttachments, Participant, ParticipantRole, ParticipantView,
    PendingRequests, User, UserSearchResult, UserStatus,
};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>>;

    /// Make sure a record exists for a verified identity, returning it.
    async fn ensure_user(&self, identity: &Identity) -> ServiceResult<User>;

    /// Persist a status change. Returns `false` when the user is unknown.
    async fn set_status(
        &self,
        user_id: &str,
        status: UserStatus,
        last_seen: DateTime<Utc>,
    ) -> ServiceResult<bool>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn get_conversation(&self, conversation_id: &str) -> ServiceResult<Option<Conversation>>;

    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> ServiceResult<bool>;

    async fn send_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        content: &str,
        message_type: MessageType,
        reply_to_id: Option<&str>,
    ) -> ServiceResult<Option<Message>>;

    async fn get_message(&self, message_id: &str) -> ServiceResult<Option<Message>>;

    /// Only the sender may edit; returns the updated message.
    async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> ServiceResult<Option<Message>>;

    /// Soft delete by the sender; returns the deleted message.
    async fn delete_message(&self, user_id: &str, message_id: &str)
        -> ServiceResult<Option<Message>>;

    async fn mark_as_read(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> ServiceResult<bool>;

    async fn create_group(
        &self,
        creator_id: &str,
        name: &str,
        description: Option<&str>,
        participant_ids: &[String],
    ) -> ServiceResult<Option<Conversation>>;

    /// Returns the existing direct conversation between the two users if any.
    async fn create_direct(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> ServiceResult<Option<Conversation>>;

    /// Requires `actor_id` to be an owner or admin of the conversation.
    async fn add_participant(
        &self,
        actor_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> ServiceResult<bool>;

    /// Requires `actor_id` to be an owner or admin, or to be removing themselves.
    async fn remove_participant(
        &self,
        actor_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> ServiceResult<bool>;

    async fn user_conversations(&self, user_id: &str) -> ServiceResult<Vec<ConversationSummary>>;

    /// Oldest first, paging back from the newest message.
    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Message>>;

    async fn participants(&self, conversation_id: &str) -> ServiceResult<Vec<ParticipantView>>;
}

#[async_trait]
pub trait ContactService: Send + Sync {
    async fn send_request(&self, from_user_id: &str, to_user_id: &str)
        -> ServiceResult<Option<Contact>>;

    /// Only the addressee of a pending request may accept it.
    async fn accept_request(&self, user_id: &str, contact_id: &str)
        -> ServiceResult<Option<Contact>>;

    async fn decline_request(&self, user_id: &str, contact_id: &str)
        -> ServiceResult<Option<Contact>>;

    async fn remove_contact(&self, user_id: &str, contact_user_id: &str) -> ServiceResult<bool>;

    async fn block_user(&self, user_id: &str, blocked_user_id: &str) -> ServiceResult<bool>;

    async fn unblock_user(&self, user_id: &str, blocked_user_id: &str) -> ServiceResult<bool>;

    async fn contacts(&self, user_id: &str) -> ServiceResult<Vec<ContactView>>;

    async fn pending_requests(&self, user_id: &str) -> ServiceResult<PendingRequests>;

    async fn blocked_users(&self, user_id: &str) -> ServiceResult<Vec<ContactView>>;

    async fn search_users(
        &self,
        query: &str,
        current_user_id: &str,
        limit: usize,
    ) -> ServiceResult<Vec<UserSearchResult>>;
}

#[async_trait]
pub trait FileService: Send + Sync {
    async fn message_attachments(&self, message_id: &str) -> ServiceResult<Vec<FileAttachment>>;
}

/// The collaborator set handed to the dispatcher.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserStore>,
    pub chat: Arc<dyn ChatService>,
    pub contacts: Arc<dyn ContactService>,
    pub files: Arc<dyn FileService>,
}

impl Services {
    /// Wire every collaborator to one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            chat: store.clone(),
            contacts: store.clone(),
            files: store,
        }
    }
}
