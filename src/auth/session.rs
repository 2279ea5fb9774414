use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{Identity, SessionVerifier};

#[derive(Debug, Clone)]
struct SessionRecord {
    identity: Identity,
    expires_at: DateTime<Utc>,
    active: bool,
}

/// Opaque session tokens kept in memory.
///
/// Expired sessions are deactivated the first time they are presented.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token for `identity`, valid for `ttl`.
    pub fn issue(&self, identity: Identity, ttl: Duration) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.sessions.insert(
            token.clone(),
            SessionRecord {
                identity,
                expires_at,
                active: true,
            },
        );
        token
    }

    pub fn revoke(&self, token: &str) -> bool {
        match self.sessions.get_mut(token) {
            Some(mut record) => {
                record.active = false;
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|r| r.active).count()
    }
}

#[async_trait]
impl SessionVerifier for MemorySessionStore {
    async fn verify(&self, token: &str) -> Option<Identity> {
        let mut record = self.sessions.get_mut(token)?;
        if !record.active {
            return None;
        }
        if record.expires_at <= Utc::now() {
            record.active = false;
            tracing::debug!(user_id = %record.identity.user_id, "Session expired");
            return None;
        }
        Some(record.identity.clone())
    }
}
