use std::sync::Arc;
use std::time::Instant;

use crate::auth::{JwtSessionVerifier, SessionVerifier};
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;
use crate::presence::PresenceTracker;
use crate::services::{InMemoryStore, Services};
use crate::websocket::MessageDispatcher;

/// Process-wide state shared by the socket loop, the HTTP routes and the
/// background tasks.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub services: Services,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, verifier: Arc<dyn SessionVerifier>, services: Services) -> Self {
        let presence = PresenceTracker::new(services.users.clone());
        let connection_manager = Arc::new(ConnectionManager::new(
            verifier,
            presence,
            settings.websocket.backpressure_threshold,
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            connection_manager.clone(),
            services.clone(),
            settings.chat.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            connection_manager,
            dispatcher,
            services,
            start_time: Instant::now(),
        }
    }

    /// JWT sessions with every collaborator held in memory
    pub fn in_memory(settings: Settings) -> Self {
        let verifier = Arc::new(JwtSessionVerifier::new(&settings.jwt));
        let services = Services::in_memory(Arc::new(InMemoryStore::new()));
        Self::new(settings, verifier, services)
    }
}
