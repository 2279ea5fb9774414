//! Session verification for WebSocket clients.
//!
//! A client presents an opaque token; a [`SessionVerifier`] turns it into an
//! [`Identity`] or refuses it. Refusals and verifier faults look the same to the
//! caller: no identity.

mod claims;
mod jwt;
mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use claims::Claims;
pub use jwt::JwtSessionVerifier;
pub use session::MemorySessionStore;

/// Verified identity bound to a connection after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Resolve a token to the identity it was issued for.
    async fn verify(&self, token: &str) -> Option<Identity>;
}
