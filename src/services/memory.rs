//! DashMap-backed implementation of every collaborator contract.
//!
//! Used for local runs and tests; a database-backed deployment provides its own
//! implementations of the traits in `services`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::Identity;

use super::models::{
    Contact, ContactStatus, ContactView, Conversation, ConversationSummary, ConversationType,
    FileAttachment, Message, MessageType, Participant, ParticipantRole, ParticipantView,
    PendingRequests, User, UserSearchResult, UserStatus,
};
use super::{ChatService, ContactService, FileService, ServiceResult, UserStore};

struct StoredMessage {
    seq: u64,
    message: Message,
}

#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<String, User>,
    conversations: DashMap<String, Conversation>,
    /// conversation_id -> participants (including those who left)
    participants: DashMap<String, Vec<Participant>>,
    messages: DashMap<String, StoredMessage>,
    contacts: DashMap<String, Contact>,
    /// message_id -> attachments
    attachments: DashMap<String, Vec<FileAttachment>>,
    seq: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record.
    pub fn insert_user(&self, user: User) -> User {
        self.users.insert(user.id.clone(), user.clone());
        user
    }

    /// Record an attachment for an existing message.
    pub fn attach_file(&self, attachment: FileAttachment) {
        self.attachments
            .entry(attachment.message_id.clone())
            .or_default()
            .push(attachment);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.clone())
    }

    fn active_participant(&self, conversation_id: &str, user_id: &str) -> Option<Participant> {
        self.participants.get(conversation_id).and_then(|list| {
            list.iter()
                .find(|p| p.user_id == user_id && p.is_active())
                .cloned()
        })
    }

    fn add_participant_record(&self, conversation_id: &str, user_id: &str, role: ParticipantRole) {
        let participant = Participant {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at: Utc::now(),
            left_at: None,
            last_read_message_id: None,
            is_muted: false,
        };
        self.participants
            .entry(conversation_id.to_string())
            .or_default()
            .push(participant);
    }

    fn new_conversation(
        kind: ConversationType,
        creator_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Self::new_id(),
            kind,
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            avatar_url: None,
            created_by: Some(creator_id.to_string()),
            created_at: now,
            updated_at: now,
            is_active: true,
        }
    }

    fn find_direct(&self, user_id: &str, other_user_id: &str) -> Option<Conversation> {
        self.conversations
            .iter()
            .filter(|c| c.kind == ConversationType::Direct && c.is_active)
            .find(|c| {
                self.active_participant(&c.id, user_id).is_some()
                    && self.active_participant(&c.id, other_user_id).is_some()
            })
            .map(|c| c.value().clone())
    }

    fn edge(&self, user_id: &str, contact_user_id: &str) -> Option<Contact> {
        self.contacts
            .iter()
            .find(|c| c.user_id == user_id && c.contact_user_id == contact_user_id)
            .map(|c| c.value().clone())
    }

    fn edges_where(&self, predicate: impl Fn(&Contact) -> bool) -> Vec<Contact> {
        let mut edges: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| predicate(c.value()))
            .map(|c| c.value().clone())
            .collect();
        edges.sort_by_key(|c| c.created_at);
        edges
    }

    fn with_user(&self, contact: Contact, user_id: &str) -> Option<ContactView> {
        self.user(user_id).map(|user| ContactView { contact, user })
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn ensure_user(&self, identity: &Identity) -> ServiceResult<User> {
        let user = self
            .users
            .entry(identity.user_id.clone())
            .or_insert_with(|| {
                let username = identity
                    .username
                    .clone()
                    .unwrap_or_else(|| identity.user_id.clone());
                User::new(identity.user_id.clone(), username)
            })
            .clone();
        Ok(user)
    }

    async fn set_status(
        &self,
        user_id: &str,
        status: UserStatus,
        last_seen: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        match self.users.get_mut(user_id) {
            Some(mut user) => {
                user.status = status;
                user.last_seen = last_seen;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ChatService for InMemoryStore {
    async fn get_conversation(&self, conversation_id: &str) -> ServiceResult<Option<Conversation>> {
        Ok(self.conversations.get(conversation_id).map(|c| c.clone()))
    }

    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> ServiceResult<bool> {
        Ok(self.active_participant(conversation_id, user_id).is_some())
    }

    async fn send_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        content: &str,
        message_type: MessageType,
        reply_to_id: Option<&str>,
    ) -> ServiceResult<Option<Message>> {
        if self.user(sender_id).is_none() {
            return Ok(None);
        }
        if self.active_participant(conversation_id, sender_id).is_none() {
            return Ok(None);
        }
        let Some(mut conversation) = self.conversations.get_mut(conversation_id) else {
            return Ok(None);
        };

        let now = Utc::now();
        let message = Message {
            id: Self::new_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: Some(sender_id.to_string()),
            content: Some(content.to_string()),
            message_type,
            reply_to_id: reply_to_id.map(str::to_string),
            created_at: now,
            edited_at: None,
            deleted_at: None,
            is_pinned: false,
        };
        conversation.updated_at = now;
        drop(conversation);

        self.messages.insert(
            message.id.clone(),
            StoredMessage {
                seq: self.next_seq(),
                message: message.clone(),
            },
        );
        Ok(Some(message))
    }

    async fn get_message(&self, message_id: &str) -> ServiceResult<Option<Message>> {
        Ok(self.messages.get(message_id).map(|m| m.message.clone()))
    }

    async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> ServiceResult<Option<Message>> {
        let Some(mut stored) = self.messages.get_mut(message_id) else {
            return Ok(None);
        };
        let message = &mut stored.message;
        if message.sender_id.as_deref() != Some(user_id) || message.is_deleted() {
            return Ok(None);
        }
        message.content = Some(content.to_string());
        message.edited_at = Some(Utc::now());
        Ok(Some(message.clone()))
    }

    async fn delete_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> ServiceResult<Option<Message>> {
        let Some(mut stored) = self.messages.get_mut(message_id) else {
            return Ok(None);
        };
        let message = &mut stored.message;
        if message.sender_id.as_deref() != Some(user_id) || message.is_deleted() {
            return Ok(None);
        }
        message.deleted_at = Some(Utc::now());
        Ok(Some(message.clone()))
    }

    async fn mark_as_read(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> ServiceResult<bool> {
        let Some(mut list) = self.participants.get_mut(conversation_id) else {
            return Ok(false);
        };
        match list
            .iter_mut()
            .find(|p| p.user_id == user_id && p.is_active())
        {
            Some(participant) => {
                participant.last_read_message_id = Some(message_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_group(
        &self,
        creator_id: &str,
        name: &str,
        description: Option<&str>,
        participant_ids: &[String],
    ) -> ServiceResult<Option<Conversation>> {
        if self.user(creator_id).is_none() {
            return Ok(None);
        }

        let conversation =
            Self::new_conversation(ConversationType::Group, creator_id, Some(name), description);
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        self.add_participant_record(&conversation.id, creator_id, ParticipantRole::Owner);

        for user_id in participant_ids {
            if user_id == creator_id || self.user(user_id).is_none() {
                continue;
            }
            if self.active_participant(&conversation.id, user_id).is_none() {
                self.add_participant_record(&conversation.id, user_id, ParticipantRole::Member);
            }
        }

        Ok(Some(conversation))
    }

    async fn create_direct(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> ServiceResult<Option<Conversation>> {
        if user_id == other_user_id || self.user(user_id).is_none() || self.user(other_user_id).is_none() {
            return Ok(None);
        }
        if let Some(existing) = self.find_direct(user_id, other_user_id) {
            return Ok(Some(existing));
        }

        let conversation = Self::new_conversation(ConversationType::Direct, user_id, None, None);
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        self.add_participant_record(&conversation.id, user_id, ParticipantRole::Member);
        self.add_participant_record(&conversation.id, other_user_id, ParticipantRole::Member);
        Ok(Some(conversation))
    }

    async fn add_participant(
        &self,
        actor_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> ServiceResult<bool> {
        let is_group = self
            .conversations
            .get(conversation_id)
            .map(|c| c.kind == ConversationType::Group)
            .unwrap_or(false);
        if !is_group || self.user(user_id).is_none() {
            return Ok(false);
        }
        match self.active_participant(conversation_id, actor_id) {
            Some(actor) if actor.role.can_manage() => {}
            _ => return Ok(false),
        }
        if self.active_participant(conversation_id, user_id).is_some() {
            return Ok(false);
        }
        self.add_participant_record(conversation_id, user_id, ParticipantRole::Member);
        Ok(true)
    }

    async fn remove_participant(
        &self,
        actor_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> ServiceResult<bool> {
        let allowed = actor_id == user_id
            || self
                .active_participant(conversation_id, actor_id)
                .map(|actor| actor.role.can_manage())
                .unwrap_or(false);
        if !allowed {
            return Ok(false);
        }

        let Some(mut list) = self.participants.get_mut(conversation_id) else {
            return Ok(false);
        };
        match list
            .iter_mut()
            .find(|p| p.user_id == user_id && p.is_active())
        {
            Some(participant) => {
                participant.left_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn user_conversations(&self, user_id: &str) -> ServiceResult<Vec<ConversationSummary>> {
        let ids: Vec<String> = self
            .participants
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .any(|p| p.user_id == user_id && p.is_active())
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(conversation) = self.conversations.get(&id).map(|c| c.clone()) else {
                continue;
            };
            if !conversation.is_active {
                continue;
            }

            let last_message = self
                .messages
                .iter()
                .filter(|m| m.message.conversation_id == id && !m.message.is_deleted())
                .max_by_key(|m| m.seq)
                .map(|m| m.message.clone());

            let other_user = if conversation.kind == ConversationType::Direct {
                self.participants.get(&id).and_then(|list| {
                    list.iter()
                        .find(|p| p.user_id != user_id && p.is_active())
                        .and_then(|p| self.user(&p.user_id))
                })
            } else {
                None
            };

            summaries.push(ConversationSummary {
                conversation,
                last_message,
                other_user,
            });
        }

        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        Ok(summaries)
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Message>> {
        let mut found: Vec<(u64, Message)> = self
            .messages
            .iter()
            .filter(|m| m.message.conversation_id == conversation_id && !m.message.is_deleted())
            .map(|m| (m.seq, m.message.clone()))
            .collect();

        // newest first for paging, then back to chronological order
        found.sort_by(|a, b| b.0.cmp(&a.0));
        let mut page: Vec<Message> = found
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, m)| m)
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn participants(&self, conversation_id: &str) -> ServiceResult<Vec<ParticipantView>> {
        let active: Vec<Participant> = self
            .participants
            .get(conversation_id)
            .map(|list| list.iter().filter(|p| p.is_active()).cloned().collect())
            .unwrap_or_default();

        Ok(active
            .into_iter()
            .filter_map(|participant| {
                self.user(&participant.user_id)
                    .map(|user| ParticipantView { participant, user })
            })
            .collect())
    }
}

#[async_trait]
impl ContactService for InMemoryStore {
    async fn send_request(
        &self,
        from_user_id: &str,
        to_user_id: &str,
    ) -> ServiceResult<Option<Contact>> {
        if from_user_id == to_user_id
            || self.user(from_user_id).is_none()
            || self.user(to_user_id).is_none()
        {
            return Ok(None);
        }
        if self.edge(from_user_id, to_user_id).is_some() || self.edge(to_user_id, from_user_id).is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        let contact = Contact {
            id: Self::new_id(),
            user_id: from_user_id.to_string(),
            contact_user_id: to_user_id.to_string(),
            status: ContactStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.contacts.insert(contact.id.clone(), contact.clone());
        Ok(Some(contact))
    }

    async fn accept_request(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> ServiceResult<Option<Contact>> {
        let accepted = {
            let Some(mut contact) = self.contacts.get_mut(contact_id) else {
                return Ok(None);
            };
            if contact.contact_user_id != user_id || contact.status != ContactStatus::Pending {
                return Ok(None);
            }
            contact.status = ContactStatus::Accepted;
            contact.updated_at = Utc::now();
            contact.clone()
        };

        let now = Utc::now();
        let reverse = Contact {
            id: Self::new_id(),
            user_id: accepted.contact_user_id.clone(),
            contact_user_id: accepted.user_id.clone(),
            status: ContactStatus::Accepted,
            created_at: now,
            updated_at: now,
        };
        self.contacts.insert(reverse.id.clone(), reverse);
        Ok(Some(accepted))
    }

    async fn decline_request(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> ServiceResult<Option<Contact>> {
        let Some(mut contact) = self.contacts.get_mut(contact_id) else {
            return Ok(None);
        };
        if contact.contact_user_id != user_id || contact.status != ContactStatus::Pending {
            return Ok(None);
        }
        contact.status = ContactStatus::Declined;
        contact.updated_at = Utc::now();
        Ok(Some(contact.clone()))
    }

    async fn remove_contact(&self, user_id: &str, contact_user_id: &str) -> ServiceResult<bool> {
        let before = self.contacts.len();
        self.contacts.retain(|_, c| {
            let forward = c.user_id == user_id && c.contact_user_id == contact_user_id;
            let backward = c.user_id == contact_user_id && c.contact_user_id == user_id;
            !((forward || backward) && c.status == ContactStatus::Accepted)
        });
        Ok(self.contacts.len() < before)
    }

    async fn block_user(&self, user_id: &str, blocked_user_id: &str) -> ServiceResult<bool> {
        if user_id == blocked_user_id || self.user(user_id).is_none() || self.user(blocked_user_id).is_none() {
            return Ok(false);
        }

        let now = Utc::now();
        match self.edge(user_id, blocked_user_id) {
            Some(existing) => {
                if let Some(mut contact) = self.contacts.get_mut(&existing.id) {
                    contact.status = ContactStatus::Blocked;
                    contact.updated_at = now;
                }
            }
            None => {
                let contact = Contact {
                    id: Self::new_id(),
                    user_id: user_id.to_string(),
                    contact_user_id: blocked_user_id.to_string(),
                    status: ContactStatus::Blocked,
                    created_at: now,
                    updated_at: now,
                };
                self.contacts.insert(contact.id.clone(), contact);
            }
        }

        if let Some(reverse) = self.edge(blocked_user_id, user_id) {
            self.contacts.remove(&reverse.id);
        }
        Ok(true)
    }

    async fn unblock_user(&self, user_id: &str, blocked_user_id: &str) -> ServiceResult<bool> {
        match self.edge(user_id, blocked_user_id) {
            Some(contact) if contact.status == ContactStatus::Blocked => {
                self.contacts.remove(&contact.id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn contacts(&self, user_id: &str) -> ServiceResult<Vec<ContactView>> {
        Ok(self
            .edges_where(|c| c.user_id == user_id && c.status == ContactStatus::Accepted)
            .into_iter()
            .filter_map(|c| {
                let other = c.contact_user_id.clone();
                self.with_user(c, &other)
            })
            .collect())
    }

    async fn pending_requests(&self, user_id: &str) -> ServiceResult<PendingRequests> {
        let incoming = self
            .edges_where(|c| c.contact_user_id == user_id && c.status == ContactStatus::Pending)
            .into_iter()
            .filter_map(|c| {
                let from = c.user_id.clone();
                self.with_user(c, &from)
            })
            .collect();
        let outgoing = self
            .edges_where(|c| c.user_id == user_id && c.status == ContactStatus::Pending)
            .into_iter()
            .filter_map(|c| {
                let to = c.contact_user_id.clone();
                self.with_user(c, &to)
            })
            .collect();
        Ok(PendingRequests { incoming, outgoing })
    }

    async fn blocked_users(&self, user_id: &str) -> ServiceResult<Vec<ContactView>> {
        Ok(self
            .edges_where(|c| c.user_id == user_id && c.status == ContactStatus::Blocked)
            .into_iter()
            .filter_map(|c| {
                let other = c.contact_user_id.clone();
                self.with_user(c, &other)
            })
            .collect())
    }

    async fn search_users(
        &self,
        query: &str,
        current_user_id: &str,
        limit: usize,
    ) -> ServiceResult<Vec<UserSearchResult>> {
        let needle = query.to_lowercase();
        let mut matches: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.id != current_user_id)
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.display_name.to_lowercase().contains(&needle)
            })
            .map(|u| u.value().clone())
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        matches.truncate(limit);

        Ok(matches
            .into_iter()
            .map(|user| {
                let contact_status = self.edge(current_user_id, &user.id).map(|c| c.status);
                UserSearchResult {
                    user,
                    contact_status,
                }
            })
            .collect())
    }
}

#[async_trait]
impl FileService for InMemoryStore {
    async fn message_attachments(&self, message_id: &str) -> ServiceResult<Vec<FileAttachment>> {
        Ok(self
            .attachments
            .get(message_id)
            .map(|list| list.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users(ids: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for id in ids {
            store.insert_user(User::new(*id, format!("user_{}", id)));
        }
        store
    }

    #[tokio::test]
    async fn test_only_participants_can_send() {
        let store = store_with_users(&["alice", "bob", "eve"]);
        let group = store
            .create_group("alice", "team", None, &["bob".to_string()])
            .await
            .unwrap()
            .unwrap();

        let sent = store
            .send_message("bob", &group.id, "hello", MessageType::Text, None)
            .await
            .unwrap();
        assert!(sent.is_some());

        let refused = store
            .send_message("eve", &group.id, "let me in", MessageType::Text, None)
            .await
            .unwrap();
        assert!(refused.is_none());
    }

    #[tokio::test]
    async fn test_only_sender_edits_and_deletes() {
        let store = store_with_users(&["alice", "bob"]);
        let chat = store.create_direct("alice", "bob").await.unwrap().unwrap();
        let message = store
            .send_message("alice", &chat.id, "v1", MessageType::Text, None)
            .await
            .unwrap()
            .unwrap();

        assert!(store.edit_message("bob", &message.id, "hijack").await.unwrap().is_none());
        let edited = store.edit_message("alice", &message.id, "v2").await.unwrap().unwrap();
        assert_eq!(edited.content.as_deref(), Some("v2"));
        assert!(edited.edited_at.is_some());

        assert!(store.delete_message("bob", &message.id).await.unwrap().is_none());
        assert!(store.delete_message("alice", &message.id).await.unwrap().is_some());
        let history = store.conversation_messages(&chat.id, 50, 0).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_direct_chat_is_reused() {
        let store = store_with_users(&["alice", "bob"]);
        let first = store.create_direct("alice", "bob").await.unwrap().unwrap();
        let second = store.create_direct("bob", "alice").await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert!(store.create_direct("alice", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_pages_back_from_newest() {
        let store = store_with_users(&["alice", "bob"]);
        let chat = store.create_direct("alice", "bob").await.unwrap().unwrap();
        for i in 0..5 {
            store
                .send_message("alice", &chat.id, &format!("m{}", i), MessageType::Text, None)
                .await
                .unwrap();
        }

        let page = store.conversation_messages(&chat.id, 2, 1).await.unwrap();
        let contents: Vec<_> = page.iter().filter_map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["m2".to_string(), "m3".to_string()]);
    }

    #[tokio::test]
    async fn test_only_managers_add_participants() {
        let store = store_with_users(&["owner", "member", "newcomer"]);
        let group = store
            .create_group("owner", "team", None, &["member".to_string()])
            .await
            .unwrap()
            .unwrap();

        assert!(!store.add_participant("member", &group.id, "newcomer").await.unwrap());
        assert!(store.add_participant("owner", &group.id, "newcomer").await.unwrap());
        assert!(!store.add_participant("owner", &group.id, "newcomer").await.unwrap());

        // members may leave on their own
        assert!(store.remove_participant("member", &group.id, "member").await.unwrap());
        assert!(!store.is_participant(&group.id, "member").await.unwrap());
    }

    #[tokio::test]
    async fn test_contact_request_lifecycle() {
        let store = store_with_users(&["alice", "bob"]);
        let request = store.send_request("alice", "bob").await.unwrap().unwrap();
        assert_eq!(request.status, ContactStatus::Pending);

        // duplicate in either direction is refused
        assert!(store.send_request("bob", "alice").await.unwrap().is_none());

        // only the addressee may accept
        assert!(store.accept_request("alice", &request.id).await.unwrap().is_none());
        let accepted = store.accept_request("bob", &request.id).await.unwrap().unwrap();
        assert_eq!(accepted.user_id, "alice");

        assert_eq!(store.contacts("alice").await.unwrap().len(), 1);
        assert_eq!(store.contacts("bob").await.unwrap().len(), 1);

        assert!(store.remove_contact("bob", "alice").await.unwrap());
        assert!(store.contacts("alice").await.unwrap().is_empty());
        assert!(!store.remove_contact("bob", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_replaces_reverse_edge() {
        let store = store_with_users(&["alice", "bob"]);
        store.send_request("bob", "alice").await.unwrap().unwrap();

        assert!(store.block_user("alice", "bob").await.unwrap());
        let pending = store.pending_requests("alice").await.unwrap();
        assert!(pending.incoming.is_empty());
        assert_eq!(store.blocked_users("alice").await.unwrap().len(), 1);

        assert!(store.unblock_user("alice", "bob").await.unwrap());
        assert!(!store.unblock_user("alice", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_excludes_self() {
        let store = store_with_users(&["alice", "alina", "bob"]);
        let results = store.search_users("ALI", "alice", 20).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user.id, "alina");
        assert!(results[0].contact_status.is_none());
    }
}
