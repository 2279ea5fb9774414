//! Presence bookkeeping: derives a user's status from the connection registry and
//! persists transitions through the [`UserStore`].

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::Identity;
use crate::services::{User, UserStatus, UserStore};

/// Derives online/offline from registry occupancy.
///
/// Status writes for one user are serialized, and each connect or disconnect
/// transition re-checks occupancy once it holds that user's lock. A transition
/// decided before a racing connect or disconnect is skipped, so the last write
/// always matches the registry.
pub struct PresenceTracker {
    users: Arc<dyn UserStore>,
    /// user_id -> writer lock, dropped when no write is pending
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl PresenceTracker {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            writers: DashMap::new(),
        }
    }

    /// First live connection for this user. Makes sure the user record exists and
    /// marks it online while `still_live` holds.
    pub async fn user_connected(
        &self,
        identity: &Identity,
        still_live: impl Fn() -> bool,
    ) -> Option<User> {
        let user = match self.users.ensure_user(identity).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = %identity.user_id, error = %e, "Failed to load user record");
                return None;
            }
        };
        self.transition(&identity.user_id, UserStatus::Online, still_live)
            .await;
        Some(user)
    }

    /// Last live connection for this user went away. Skipped if `still_live`
    /// reports a connection again by the time the write runs.
    pub async fn user_disconnected(&self, user_id: &str, still_live: impl Fn() -> bool) {
        self.transition(user_id, UserStatus::Offline, || !still_live())
            .await;
    }

    /// Explicit status change requested by the user.
    pub async fn set_status(&self, user_id: &str, status: UserStatus) -> bool {
        self.transition(user_id, status, || true).await
    }

    /// Effective status: a user with a live connection is at least online (keeping
    /// an explicit away or busy), everyone else reports what was last persisted.
    pub async fn status(&self, user_id: &str, live: bool) -> UserStatus {
        let stored = match self.users.get_user(user_id).await {
            Ok(user) => user.map(|u| u.status),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read user status");
                None
            }
        };

        match (live, stored) {
            (true, Some(status @ (UserStatus::Away | UserStatus::Busy))) => status,
            (true, _) => UserStatus::Online,
            (false, stored) => stored.unwrap_or(UserStatus::Offline),
        }
    }

    async fn transition(
        &self,
        user_id: &str,
        status: UserStatus,
        applies: impl Fn() -> bool,
    ) -> bool {
        let writer = self.writers.entry(user_id.to_string()).or_default().clone();

        let persisted = {
            let _guard = writer.lock().await;
            if applies() {
                self.persist(user_id, status).await
            } else {
                debug!(user_id = %user_id, status = status.as_str(), "Skipped stale presence transition");
                false
            }
        };

        drop(writer);
        self.writers
            .remove_if(user_id, |_, writer| Arc::strong_count(writer) == 1);
        persisted
    }

    async fn persist(&self, user_id: &str, status: UserStatus) -> bool {
        match self.users.set_status(user_id, status, Utc::now()).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(user_id = %user_id, status = status.as_str(), error = %e, "Failed to persist user status");
                false
            }
        }
    }
}
