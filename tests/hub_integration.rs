//! End-to-end tests driving the hub through its public API: real channel-backed
//! transports, the in-memory collaborators and JWT-minted tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use chat_hub_service::auth::{Claims, JwtSessionVerifier, MemorySessionStore, Identity};
use chat_hub_service::config::{
    ChatConfig, JwtConfig, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
use chat_hub_service::connection_manager::{
    ChannelTransport, ConnectionId, ConnectionManager, ConnectionStats, OutboundFrame, Transport,
    TransportError,
};
use chat_hub_service::error::ServiceError;
use chat_hub_service::presence::PresenceTracker;
use chat_hub_service::server::{create_app, AppState};
use chat_hub_service::services::{
    ChatService, Conversation, ConversationSummary, InMemoryStore, Message, MessageType,
    ParticipantView, ServiceResult, Services, User, UserStatus, UserStore,
};
use chat_hub_service::websocket::MessageDispatcher;

const SECRET: &str = "integration-test-secret";

fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: SECRET.to_string(),
        issuer: None,
        audience: None,
    }
}

fn mint_token(user_id: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        username: Some(format!("{}_name", user_id)),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

struct Hub {
    dispatcher: MessageDispatcher,
    manager: Arc<ConnectionManager>,
    store: Arc<InMemoryStore>,
}

struct Client {
    id: ConnectionId,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl Client {
    /// Every text frame queued for this client so far, decoded
    fn events(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                events.push(serde_json::from_str(&text).unwrap());
            }
        }
        events
    }

    fn single_event(&mut self) -> Value {
        let mut events = self.events();
        assert_eq!(events.len(), 1, "expected exactly one event, got {:?}", events);
        events.remove(0)
    }
}

impl Hub {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_services(store.clone(), Services::in_memory(store))
    }

    fn with_services(store: Arc<InMemoryStore>, services: Services) -> Self {
        let presence = PresenceTracker::new(store.clone());
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(JwtSessionVerifier::new(&jwt_config())),
            presence,
            48,
        ));
        let dispatcher = MessageDispatcher::new(manager.clone(), services, ChatConfig::default());
        Self {
            dispatcher,
            manager,
            store,
        }
    }

    fn connect(&self) -> Client {
        let (transport, rx) = ChannelTransport::channel(64);
        let id = self.manager.register(Arc::new(transport));
        Client { id, rx }
    }

    async fn request(&self, client: &Client, request: Value) {
        self.dispatcher
            .handle_text(client.id, &request.to_string())
            .await;
    }

    async fn login(&self, user_id: &str) -> Client {
        let mut client = self.connect();
        self.request(
            &client,
            json!({"type": "authenticate", "data": {"token": mint_token(user_id)}}),
        )
        .await;
        let event = client.single_event();
        assert_eq!(event["type"], "auth_success");
        client
    }
}

/// Transport whose writes always fail
struct BrokenTransport;

impl Transport for BrokenTransport {
    fn write(&self, _frame: &str) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn buffered_amount(&self) -> usize {
        0
    }

    fn close(&self, _code: u16) {}
}

#[tokio::test]
async fn test_remove_purges_every_index() {
    let hub = Hub::new();
    let client = hub.login("alice").await;
    assert!(hub.manager.subscribe(client.id, "room-1"));
    assert!(hub.manager.subscribe(client.id, "room-2"));

    assert!(hub.manager.remove(client.id, None).await);

    assert!(hub.manager.get_info(client.id).is_none());
    assert!(hub.manager.user_connection_ids("alice").is_empty());
    assert!(hub.manager.room_connection_ids("room-1").is_empty());
    assert!(hub.manager.room_connection_ids("room-2").is_empty());
    assert_eq!(hub.manager.stats(), ConnectionStats::default());
    assert!(!hub.manager.remove(client.id, None).await);
}

#[tokio::test]
async fn test_presence_follows_last_connection() {
    let hub = Hub::new();
    let first = hub.login("alice").await;
    let second = hub.login("alice").await;

    assert_eq!(hub.manager.user_connection_ids("alice").len(), 2);
    let user = hub.store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Online);

    hub.manager.remove(first.id, None).await;
    assert!(hub.manager.is_online("alice"));
    assert_eq!(hub.manager.user_status("alice").await, UserStatus::Online);

    let before = Utc::now();
    hub.manager.remove(second.id, None).await;
    assert!(!hub.manager.is_online("alice"));

    let user = hub.store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Offline);
    assert!(user.last_seen >= before);
    assert_eq!(hub.manager.user_status("alice").await, UserStatus::Offline);
}

#[tokio::test]
async fn test_room_fanout_survives_broken_transport() {
    let hub = Hub::new();
    let sessions = Arc::new(MemorySessionStore::new());
    let manager = ConnectionManager::new(
        sessions.clone(),
        PresenceTracker::new(hub.store.clone()),
        48,
    );

    let mut receivers = Vec::new();
    for user in ["a", "b", "c"] {
        let (transport, rx) = ChannelTransport::channel(8);
        let id = manager.register(Arc::new(transport));
        let token = sessions.issue(Identity::new(user), Duration::from_secs(60));
        assert!(manager.authenticate(id, &token).await);
        assert!(manager.subscribe(id, "room"));
        receivers.push(rx);
    }

    let broken = manager.register(Arc::new(BrokenTransport));
    let token = sessions.issue(Identity::new("d"), Duration::from_secs(60));
    assert!(manager.authenticate(broken, &token).await);
    assert!(manager.subscribe(broken, "room"));

    assert_eq!(manager.send_to_room("room", "hello", None), 3);
    for rx in receivers.iter_mut() {
        assert_eq!(rx.try_recv().ok(), Some(OutboundFrame::Text("hello".to_string())));
    }
    // a failed write does not evict the connection
    assert_eq!(manager.room_connection_ids("room").len(), 4);
}

#[tokio::test]
async fn test_malformed_frames_get_one_error_and_change_nothing() {
    let hub = Hub::new();
    let mut client = hub.connect();
    let before = hub.manager.stats();

    hub.dispatcher.handle_text(client.id, "{not json").await;
    let event = client.single_event();
    assert_eq!(event["type"], "error");
    assert_eq!(event["data"]["code"], "INVALID_MESSAGE_FORMAT");

    hub.request(&client, json!({"data": {"conversation_id": "c1"}}))
        .await;
    let event = client.single_event();
    assert_eq!(event["data"]["code"], "INVALID_MESSAGE_FORMAT");

    hub.request(&client, json!({"type": "teleport"})).await;
    let event = client.single_event();
    assert_eq!(event["data"]["code"], "UNKNOWN_MESSAGE_TYPE");

    hub.request(&client, json!({"type": "send_message", "data": {"content": "hi"}}))
        .await;
    let event = client.single_event();
    assert_eq!(event["data"]["code"], "INVALID_MESSAGE_FORMAT");

    assert_eq!(hub.manager.stats(), before);
    assert!(hub.manager.get_info(client.id).is_some());
}

#[tokio::test]
async fn test_anonymous_send_is_refused_without_broadcast() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    hub.request(
        &alice,
        json!({"type": "create_group", "data": {"name": "team"}}),
    )
    .await;
    let created = alice.single_event();
    let conversation_id = created["data"]["conversation"]["id"].as_str().unwrap().to_string();
    hub.request(
        &alice,
        json!({"type": "join_conversation", "data": {"conversation_id": conversation_id}}),
    )
    .await;
    alice.events();

    let mut anonymous = hub.connect();
    hub.request(
        &anonymous,
        json!({
            "type": "send_message",
            "data": {"conversation_id": conversation_id, "content": "sneaky"}
        }),
    )
    .await;

    let event = anonymous.single_event();
    assert_eq!(event["data"]["code"], "AUTHENTICATION_REQUIRED");
    assert!(alice.events().is_empty());
}

#[tokio::test]
async fn test_group_conversation_flow() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    let mut bob = hub.login("bob").await;
    let mut bob_phone = hub.login("bob").await;

    hub.request(
        &alice,
        json!({"type": "create_group", "data": {"name": "team", "participant_ids": ["bob"]}}),
    )
    .await;
    let created = alice.single_event();
    assert_eq!(created["type"], "group_created");
    assert_eq!(created["data"]["participants"].as_array().unwrap().len(), 2);
    let conversation_id = created["data"]["conversation"]["id"].as_str().unwrap().to_string();

    // both of bob's devices hear about the invitation
    assert_eq!(bob.single_event()["type"], "group_invitation");
    assert_eq!(bob_phone.single_event()["type"], "group_invitation");

    for client in [&alice, &bob] {
        hub.request(
            client,
            json!({"type": "join_conversation", "data": {"conversation_id": conversation_id}}),
        )
        .await;
    }
    assert_eq!(alice.single_event()["type"], "conversation_joined");
    assert_eq!(bob.single_event()["type"], "conversation_joined");

    hub.request(
        &alice,
        json!({
            "type": "send_message",
            "data": {"conversation_id": conversation_id, "content": "hello team"}
        }),
    )
    .await;

    let delivered = bob.single_event();
    assert_eq!(delivered["type"], "new_message");
    assert_eq!(delivered["data"]["message"]["content"], "hello team");
    assert_eq!(delivered["data"]["sender"]["id"], "alice");
    assert!(delivered["timestamp"].is_string());
    assert!(delivered["message_id"].is_string());
    // the sender is not echoed, and bob's phone never joined the room
    assert!(alice.events().is_empty());
    assert!(bob_phone.events().is_empty());

    hub.request(
        &bob,
        json!({"type": "typing_start", "data": {"conversation_id": conversation_id}}),
    )
    .await;
    let typing = alice.single_event();
    assert_eq!(typing["type"], "typing_started");
    assert_eq!(typing["data"]["user_id"], "bob");

    hub.request(
        &alice,
        json!({"type": "get_messages", "data": {"conversation_id": conversation_id}}),
    )
    .await;
    let history = alice.single_event();
    assert_eq!(history["type"], "messages_list");
    assert_eq!(history["data"]["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_outsider_cannot_join_or_send() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    let mut eve = hub.login("eve").await;

    hub.request(
        &alice,
        json!({"type": "create_group", "data": {"name": "private"}}),
    )
    .await;
    let conversation_id = alice.single_event()["data"]["conversation"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    hub.request(
        &eve,
        json!({"type": "join_conversation", "data": {"conversation_id": conversation_id}}),
    )
    .await;
    assert_eq!(eve.single_event()["data"]["code"], "PERMISSION_DENIED");
    assert!(hub.manager.room_connection_ids(&conversation_id).is_empty());

    hub.request(
        &eve,
        json!({
            "type": "send_message",
            "data": {"conversation_id": conversation_id, "content": "let me in"}
        }),
    )
    .await;
    assert_eq!(eve.single_event()["data"]["code"], "PERMISSION_DENIED");

    hub.request(
        &eve,
        json!({"type": "join_conversation", "data": {"conversation_id": "missing"}}),
    )
    .await;
    assert_eq!(eve.single_event()["data"]["code"], "CONVERSATION_NOT_FOUND");
}

#[tokio::test]
async fn test_contact_request_round_trip() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    let mut bob = hub.login("bob").await;

    hub.request(
        &alice,
        json!({"type": "send_contact_request", "data": {"user_id": "bob"}}),
    )
    .await;
    assert_eq!(alice.single_event()["type"], "contact_request_sent");
    let received = bob.single_event();
    assert_eq!(received["type"], "contact_request_received");
    assert_eq!(received["data"]["from_user"]["id"], "alice");
    let contact_id = received["data"]["contact"]["id"].as_str().unwrap().to_string();

    hub.request(
        &bob,
        json!({"type": "accept_contact_request", "data": {"contact_id": contact_id}}),
    )
    .await;
    let reply = bob.single_event();
    assert_eq!(reply["type"], "contact_request_accepted");
    assert_eq!(reply["data"]["contact_user"]["id"], "alice");
    let notice = alice.single_event();
    assert_eq!(notice["type"], "contact_request_accepted");
    assert_eq!(notice["data"]["accepted_by"]["id"], "bob");

    hub.request(&alice, json!({"type": "update_status", "data": {"status": "busy"}}))
        .await;
    let own = alice.single_event();
    assert_eq!(own["type"], "status_updated");
    assert_eq!(own["data"]["status"], "busy");
    assert_eq!(bob.single_event()["data"]["user_id"], "alice");
    assert_eq!(hub.manager.user_status("alice").await, UserStatus::Busy);
}

#[tokio::test]
async fn test_logout_keeps_connection_open() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;

    hub.request(&alice, json!({"type": "logout"})).await;
    assert_eq!(alice.single_event()["type"], "logout_success");

    assert!(!hub.manager.is_online("alice"));
    let info = hub.manager.get_info(alice.id).unwrap();
    assert!(!info.authenticated);

    hub.request(&alice, json!({"type": "get_conversations"})).await;
    assert_eq!(alice.single_event()["data"]["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_inactivity_sweep_removes_idle_connections_once() {
    let hub = Hub::new();
    let mut client = hub.login("alice").await;
    let timeout = Duration::from_secs(30 * 60);

    let later = Utc::now() + chrono::Duration::minutes(31);
    assert_eq!(hub.manager.cleanup_inactive_at(timeout, later).await, 1);
    assert_eq!(client.rx.try_recv().ok(), Some(OutboundFrame::Close(1001)));
    assert!(!hub.manager.is_online("alice"));

    assert_eq!(hub.manager.cleanup_inactive_at(timeout, later).await, 0);
}

/// Writes `Offline` only after a delay, leaving room for a reconnect in between
struct SlowOfflineStore {
    inner: Arc<InMemoryStore>,
}

#[async_trait]
impl UserStore for SlowOfflineStore {
    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn ensure_user(&self, identity: &Identity) -> ServiceResult<User> {
        self.inner.ensure_user(identity).await
    }

    async fn set_status(
        &self,
        user_id: &str,
        status: UserStatus,
        last_seen: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        if status == UserStatus::Offline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.inner.set_status(user_id, status, last_seen).await
    }
}

#[tokio::test]
async fn test_reconnect_during_offline_write_ends_online() {
    let store = Arc::new(InMemoryStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let manager = Arc::new(ConnectionManager::new(
        sessions.clone(),
        PresenceTracker::new(Arc::new(SlowOfflineStore {
            inner: store.clone(),
        })),
        48,
    ));

    let (transport_a, _rx_a) = ChannelTransport::channel(8);
    let a = manager.register(Arc::new(transport_a));
    let token = sessions.issue(Identity::new("u"), Duration::from_secs(60));
    assert!(manager.authenticate(a, &token).await);

    let removing = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.remove(a, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (transport_b, _rx_b) = ChannelTransport::channel(8);
    let b = manager.register(Arc::new(transport_b));
    assert!(manager.authenticate(b, &token).await);
    assert!(removing.await.unwrap());

    assert_eq!(manager.user_connection_ids("u").len(), 1);
    let user = store.get_user("u").await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Online);
}

/// Chat backend whose storage is down; looking up a conversation panics
struct BrokenChat;

fn unavailable<T>() -> ServiceResult<T> {
    Err(ServiceError::Unavailable("db-primary.internal refused connection".to_string()))
}

#[async_trait]
impl ChatService for BrokenChat {
    async fn get_conversation(&self, _conversation_id: &str) -> ServiceResult<Option<Conversation>> {
        panic!("conversation cache poisoned");
    }

    async fn is_participant(&self, _conversation_id: &str, _user_id: &str) -> ServiceResult<bool> {
        unavailable()
    }

    async fn send_message(
        &self,
        _sender_id: &str,
        _conversation_id: &str,
        _content: &str,
        _message_type: MessageType,
        _reply_to_id: Option<&str>,
    ) -> ServiceResult<Option<Message>> {
        unavailable()
    }

    async fn get_message(&self, _message_id: &str) -> ServiceResult<Option<Message>> {
        unavailable()
    }

    async fn edit_message(
        &self,
        _user_id: &str,
        _message_id: &str,
        _content: &str,
    ) -> ServiceResult<Option<Message>> {
        unavailable()
    }

    async fn delete_message(
        &self,
        _user_id: &str,
        _message_id: &str,
    ) -> ServiceResult<Option<Message>> {
        unavailable()
    }

    async fn mark_as_read(
        &self,
        _user_id: &str,
        _conversation_id: &str,
        _message_id: &str,
    ) -> ServiceResult<bool> {
        unavailable()
    }

    async fn create_group(
        &self,
        _creator_id: &str,
        _name: &str,
        _description: Option<&str>,
        _participant_ids: &[String],
    ) -> ServiceResult<Option<Conversation>> {
        unavailable()
    }

    async fn create_direct(
        &self,
        _user_id: &str,
        _other_user_id: &str,
    ) -> ServiceResult<Option<Conversation>> {
        unavailable()
    }

    async fn add_participant(
        &self,
        _actor_id: &str,
        _conversation_id: &str,
        _user_id: &str,
    ) -> ServiceResult<bool> {
        unavailable()
    }

    async fn remove_participant(
        &self,
        _actor_id: &str,
        _conversation_id: &str,
        _user_id: &str,
    ) -> ServiceResult<bool> {
        unavailable()
    }

    async fn user_conversations(&self, _user_id: &str) -> ServiceResult<Vec<ConversationSummary>> {
        unavailable()
    }

    async fn conversation_messages(
        &self,
        _conversation_id: &str,
        _limit: usize,
        _offset: usize,
    ) -> ServiceResult<Vec<Message>> {
        unavailable()
    }

    async fn participants(&self, _conversation_id: &str) -> ServiceResult<Vec<ParticipantView>> {
        unavailable()
    }
}

#[tokio::test]
async fn test_service_failures_become_server_errors() {
    let store = Arc::new(InMemoryStore::new());
    let mut services = Services::in_memory(store.clone());
    services.chat = Arc::new(BrokenChat);
    let hub = Hub::with_services(store, services);
    let mut alice = hub.login("alice").await;

    hub.request(
        &alice,
        json!({"type": "send_message", "data": {"conversation_id": "c1", "content": "hi"}}),
    )
    .await;
    let failed = alice.single_event();
    assert_eq!(failed["data"]["code"], "SERVER_ERROR");
    assert_eq!(failed["data"]["message"], "Internal server error");
    assert!(!failed.to_string().contains("db-primary"));

    hub.request(
        &alice,
        json!({"type": "join_conversation", "data": {"conversation_id": "c1"}}),
    )
    .await;
    let panicked = alice.single_event();
    assert_eq!(panicked["data"]["code"], "SERVER_ERROR");
    assert!(!panicked.to_string().contains("poisoned"));

    // the connection survives both and keeps serving requests
    let info = hub.manager.get_info(alice.id).unwrap();
    assert!(info.authenticated);
    assert!(hub.manager.room_connection_ids("c1").is_empty());
    hub.request(&alice, json!({"type": "get_contacts"})).await;
    assert_eq!(alice.single_event()["type"], "contacts_list");
}

/// alice and bob in a fresh group, both subscribed; returns the conversation id
async fn joined_group(hub: &Hub, alice: &mut Client, bob: &mut Client) -> String {
    hub.request(
        alice,
        json!({"type": "create_group", "data": {"name": "team", "participant_ids": ["bob"]}}),
    )
    .await;
    let conversation_id = alice.single_event()["data"]["conversation"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    for client in [&*alice, &*bob] {
        hub.request(
            client,
            json!({"type": "join_conversation", "data": {"conversation_id": conversation_id}}),
        )
        .await;
    }
    alice.events();
    bob.events();
    conversation_id
}

#[tokio::test]
async fn test_edit_and_delete_reach_whole_room() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    let mut bob = hub.login("bob").await;
    let conversation_id = joined_group(&hub, &mut alice, &mut bob).await;

    hub.request(
        &alice,
        json!({
            "type": "send_message",
            "data": {"conversation_id": conversation_id, "content": "draft"}
        }),
    )
    .await;
    let message_id = bob.single_event()["data"]["message"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    hub.request(
        &bob,
        json!({"type": "edit_message", "data": {"message_id": message_id, "content": "mine now"}}),
    )
    .await;
    assert_eq!(bob.single_event()["data"]["code"], "PERMISSION_DENIED");
    assert!(alice.events().is_empty());

    hub.request(
        &alice,
        json!({"type": "edit_message", "data": {"message_id": message_id, "content": "final"}}),
    )
    .await;
    for client in [&mut alice, &mut bob] {
        let edited = client.single_event();
        assert_eq!(edited["type"], "message_edited");
        assert_eq!(edited["data"]["content"], "final");
    }

    hub.request(
        &alice,
        json!({"type": "delete_message", "data": {"message_id": message_id}}),
    )
    .await;
    for client in [&mut alice, &mut bob] {
        let deleted = client.single_event();
        assert_eq!(deleted["type"], "message_deleted");
        assert_eq!(deleted["data"]["message_id"], message_id.as_str());
    }

    for request in [
        json!({"type": "edit_message", "data": {"message_id": "missing", "content": "x"}}),
        json!({"type": "delete_message", "data": {"message_id": "missing"}}),
    ] {
        hub.request(&alice, request).await;
        assert_eq!(alice.single_event()["data"]["code"], "MESSAGE_NOT_FOUND");
    }
    assert!(bob.events().is_empty());
}

#[tokio::test]
async fn test_removed_participant_loses_every_subscription() {
    let hub = Hub::new();
    let mut alice = hub.login("alice").await;
    let mut bob = hub.login("bob").await;
    let mut bob_phone = hub.login("bob").await;
    let conversation_id = joined_group(&hub, &mut alice, &mut bob).await;

    hub.request(
        &bob_phone,
        json!({"type": "join_conversation", "data": {"conversation_id": conversation_id}}),
    )
    .await;
    bob_phone.events();
    assert_eq!(hub.manager.room_connection_ids(&conversation_id).len(), 3);

    hub.request(
        &alice,
        json!({
            "type": "remove_participant",
            "data": {"conversation_id": conversation_id, "user_id": "bob"}
        }),
    )
    .await;

    assert_eq!(
        hub.manager.room_connection_ids(&conversation_id),
        vec![alice.id]
    );
    for device in [&mut bob, &mut bob_phone] {
        let notice = device.single_event();
        assert_eq!(notice["type"], "removed_from_conversation");
        assert_eq!(notice["data"]["removed_by"], "alice");
    }
    let reply = alice.single_event();
    assert_eq!(reply["type"], "participant_removed");
    assert_eq!(reply["data"]["user_id"], "bob");
}

fn test_settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: jwt_config(),
        websocket: WebSocketConfig::default(),
        chat: ChatConfig::default(),
        logging: LoggingConfig::default(),
    }
}

#[tokio::test]
async fn test_health_and_unknown_connection_routes() {
    let app = create_app(AppState::in_memory(test_settings()));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"]["total"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/connections/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
