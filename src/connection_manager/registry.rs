use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Identity, SessionVerifier};
use crate::metrics::{ConnectionMetrics, DeliveryMetrics};
use crate::presence::PresenceTracker;
use crate::services::UserStatus;

use super::stats::{ConnectionInfo, ConnectionStats};
use super::types::{ConnectionEntry, ConnectionId, Transport};

/// Close code for connections dropped by the server (inactivity sweep, shutdown)
pub const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Default)]
struct RegistryState {
    /// connection_id -> entry
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// user_id -> authenticated connections bound to that user (multiple devices)
    user_index: HashMap<String, HashSet<ConnectionId>>,
    /// conversation_id -> subscribed connections
    room_index: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    /// Drop `connection_id` from the user's index entry. Returns true when that was
    /// the user's last connection.
    fn unbind_user(&mut self, user_id: &str, connection_id: ConnectionId) -> bool {
        match self.user_index.get_mut(user_id) {
            Some(conns) => {
                conns.remove(&connection_id);
                if conns.is_empty() {
                    self.user_index.remove(user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    fn leave_room(&mut self, room: &str, connection_id: ConnectionId) {
        if let Some(conns) = self.room_index.get_mut(room) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                self.room_index.remove(room);
            }
        }
    }

    fn stats(&self) -> ConnectionStats {
        let authenticated = self
            .connections
            .values()
            .filter(|c| c.is_authenticated())
            .count();

        ConnectionStats {
            total_connections: self.connections.len(),
            authenticated,
            anonymous: self.connections.len() - authenticated,
            unique_users: self.user_index.len(),
            active_rooms: self.room_index.len(),
        }
    }

    fn refresh_gauges(&self) {
        let stats = self.stats();
        ConnectionMetrics::set_gauges(
            stats.total_connections,
            stats.authenticated,
            stats.unique_users,
            stats.active_rooms,
        );
    }
}

/// Recipient captured under the lock, written to after it is released
type Target = (ConnectionId, Arc<dyn Transport>);

/// Owns every live connection together with the user and room indices.
///
/// All three structures sit behind one mutex so they are always mutated together.
/// The lock is never held across an `.await`; fan-out copies its recipients out
/// first and writes afterwards.
pub struct ConnectionManager {
    inner: Mutex<RegistryState>,
    presence: PresenceTracker,
    verifier: Arc<dyn SessionVerifier>,
    backpressure_threshold: usize,
}

impl ConnectionManager {
    pub fn new(
        verifier: Arc<dyn SessionVerifier>,
        presence: PresenceTracker,
        backpressure_threshold: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryState::default()),
            presence,
            verifier,
            backpressure_threshold,
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Register a freshly opened transport as an anonymous connection
    pub fn register(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        let entry = ConnectionEntry::new(transport);
        let connection_id = entry.id;

        let mut state = self.inner.lock();
        state.connections.insert(connection_id, entry);
        state.refresh_gauges();
        drop(state);

        ConnectionMetrics::record_opened();
        tracing::info!(connection_id = %connection_id, "Connection registered");
        connection_id
    }

    /// Verify `token` and bind the resulting identity to the connection.
    ///
    /// Returns false on an unknown connection or a refused token; the connection
    /// then stays as it was. Re-authenticating as a different user moves the
    /// connection over and drops its room subscriptions.
    pub async fn authenticate(&self, connection_id: ConnectionId, token: &str) -> bool {
        if !self.inner.lock().connections.contains_key(&connection_id) {
            return false;
        }

        let Some(identity) = self.verifier.verify(token).await else {
            ConnectionMetrics::record_auth(false);
            tracing::debug!(connection_id = %connection_id, "Authentication refused");
            return false;
        };

        let (first_for_user, previous_user_gone) = {
            let mut state = self.inner.lock();
            let Some(entry) = state.connections.get_mut(&connection_id) else {
                // closed while the token was being verified
                return false;
            };

            let previous = entry.identity.replace(identity.clone());
            entry.authenticated_at = Some(Utc::now());

            let mut previous_user_gone = None;
            if let Some(previous) = previous {
                if previous.user_id != identity.user_id {
                    let rooms: Vec<String> = entry.rooms.drain().collect();
                    for room in &rooms {
                        state.leave_room(room, connection_id);
                    }
                    if state.unbind_user(&previous.user_id, connection_id) {
                        previous_user_gone = Some(previous.user_id);
                    }
                }
            }

            let conns = state.user_index.entry(identity.user_id.clone()).or_default();
            let first_for_user = conns.is_empty();
            conns.insert(connection_id);
            state.refresh_gauges();
            (first_for_user, previous_user_gone)
        };

        if let Some(user_id) = previous_user_gone {
            self.presence
                .user_disconnected(&user_id, || self.is_online(&user_id))
                .await;
        }
        if first_for_user {
            self.presence
                .user_connected(&identity, || self.is_online(&identity.user_id))
                .await;
        }

        ConnectionMetrics::record_auth(true);
        tracing::info!(connection_id = %connection_id, user_id = %identity.user_id, "Connection authenticated");
        true
    }

    /// Unbind the identity (logout). The connection stays open and anonymous.
    pub async fn deauthenticate(&self, connection_id: ConnectionId) -> bool {
        let (user_id, last) = {
            let mut state = self.inner.lock();
            let Some(entry) = state.connections.get_mut(&connection_id) else {
                return false;
            };
            let Some(identity) = entry.identity.take() else {
                return false;
            };
            entry.authenticated_at = None;
            let rooms: Vec<String> = entry.rooms.drain().collect();

            for room in &rooms {
                state.leave_room(room, connection_id);
            }
            let last = state.unbind_user(&identity.user_id, connection_id);
            state.refresh_gauges();
            (identity.user_id, last)
        };

        if last {
            self.presence
                .user_disconnected(&user_id, || self.is_online(&user_id))
                .await;
        }
        tracing::info!(connection_id = %connection_id, user_id = %user_id, "Connection deauthenticated");
        true
    }

    /// Subscribe an authenticated connection to a room. Idempotent.
    pub fn subscribe(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut state = self.inner.lock();
        let Some(entry) = state.connections.get_mut(&connection_id) else {
            return false;
        };
        if !entry.is_authenticated() {
            return false;
        }
        entry.rooms.insert(room.to_string());
        state
            .room_index
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
        state.refresh_gauges();

        tracing::debug!(connection_id = %connection_id, room = %room, "Subscribed to room");
        true
    }

    /// Idempotent; false only for an unknown connection.
    pub fn unsubscribe(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut state = self.inner.lock();
        let Some(entry) = state.connections.get_mut(&connection_id) else {
            return false;
        };
        entry.rooms.remove(room);
        state.leave_room(room, connection_id);
        state.refresh_gauges();

        tracing::debug!(connection_id = %connection_id, room = %room, "Unsubscribed from room");
        true
    }

    /// Unsubscribe every connection of `user_id` from `room`, returning how many
    /// were subscribed.
    pub fn unsubscribe_user(&self, user_id: &str, room: &str) -> usize {
        let mut state = self.inner.lock();
        let ids: Vec<ConnectionId> = state
            .user_index
            .get(user_id)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default();

        let mut count = 0;
        for id in ids {
            if let Some(entry) = state.connections.get_mut(&id) {
                if entry.rooms.remove(room) {
                    count += 1;
                }
            }
            state.leave_room(room, id);
        }
        state.refresh_gauges();
        count
    }

    /// Write one frame to one connection. A failed write is logged and reported,
    /// never retried, and does not remove the connection.
    pub fn send(&self, connection_id: ConnectionId, frame: &str) -> bool {
        let transport = self
            .inner
            .lock()
            .connections
            .get(&connection_id)
            .map(|c| c.transport.clone());

        match transport {
            Some(transport) => {
                let delivered = self.write(connection_id, transport.as_ref(), frame);
                if delivered {
                    DeliveryMetrics::record_delivered("connection", 1);
                }
                delivered
            }
            None => false,
        }
    }

    /// Send to every connection of a user; returns successful deliveries.
    pub fn send_to_user(&self, user_id: &str, frame: &str) -> usize {
        let targets: Vec<Target> = {
            let state = self.inner.lock();
            state
                .user_index
                .get(user_id)
                .map(|conns| {
                    conns
                        .iter()
                        .filter_map(|id| {
                            state.connections.get(id).map(|c| (*id, c.transport.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        self.deliver("user", targets, frame)
    }

    /// Send to every authenticated subscriber of `room`, skipping connections of
    /// `exclude_user_id`.
    pub fn send_to_room(&self, room: &str, frame: &str, exclude_user_id: Option<&str>) -> usize {
        let targets: Vec<Target> = {
            let state = self.inner.lock();
            state
                .room_index
                .get(room)
                .map(|conns| {
                    conns
                        .iter()
                        .filter_map(|id| state.connections.get(id))
                        .filter(|c| match c.user_id() {
                            Some(user_id) => exclude_user_id != Some(user_id),
                            None => false,
                        })
                        .map(|c| (c.id, c.transport.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        self.deliver("room", targets, frame)
    }

    pub fn broadcast(&self, frame: &str, authenticated_only: bool) -> usize {
        let targets: Vec<Target> = {
            let state = self.inner.lock();
            state
                .connections
                .values()
                .filter(|c| !authenticated_only || c.is_authenticated())
                .map(|c| (c.id, c.transport.clone()))
                .collect()
        };

        self.deliver("broadcast", targets, frame)
    }

    /// Purge a connection from the table and both indices.
    ///
    /// `close_code` closes the transport with that code; pass `None` when the
    /// transport is already gone. Removing an unknown id is a no-op.
    pub async fn remove(&self, connection_id: ConnectionId, close_code: Option<u16>) -> bool {
        let (entry, last_for_user) = {
            let mut state = self.inner.lock();
            let Some(entry) = state.connections.remove(&connection_id) else {
                return false;
            };
            for room in &entry.rooms {
                state.leave_room(room, connection_id);
            }
            let last_for_user = match entry.user_id() {
                Some(user_id) => state.unbind_user(user_id, connection_id),
                None => false,
            };
            state.refresh_gauges();
            (entry, last_for_user)
        };

        if let Some(code) = close_code {
            entry.transport.close(code);
        }

        if last_for_user {
            if let Some(user_id) = entry.user_id() {
                self.presence
                    .user_disconnected(user_id, || self.is_online(user_id))
                    .await;
            }
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = ?entry.user_id(),
            "Connection removed"
        );
        true
    }

    pub fn get_info(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let state = self.inner.lock();
        let entry = state.connections.get(&connection_id)?;

        let mut rooms: Vec<String> = entry.rooms.iter().cloned().collect();
        rooms.sort();

        Some(ConnectionInfo {
            id: entry.id,
            user_id: entry.identity.as_ref().map(|i| i.user_id.clone()),
            username: entry.identity.as_ref().and_then(|i| i.username.clone()),
            authenticated: entry.is_authenticated(),
            connected_at: entry.connected_at,
            authenticated_at: entry.authenticated_at,
            last_activity: entry.last_activity,
            rooms,
            buffered_amount: entry.transport.buffered_amount(),
        })
    }

    pub fn identity(&self, connection_id: ConnectionId) -> Option<Identity> {
        self.inner
            .lock()
            .connections
            .get(&connection_id)
            .and_then(|c| c.identity.clone())
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.lock().stats()
    }

    pub fn user_connection_ids(&self, user_id: &str) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .user_index
            .get(user_id)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_connection_ids(&self, room: &str) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .room_index
            .get(room)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.lock().user_index.contains_key(user_id)
    }

    /// Effective presence of a user, combining live occupancy with the stored state
    pub async fn user_status(&self, user_id: &str) -> UserStatus {
        let live = self.is_online(user_id);
        self.presence.status(user_id, live).await
    }

    /// Stamp inbound activity on a connection
    pub fn record_activity(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.inner.lock().connections.get_mut(&connection_id) {
            entry.last_activity = Utc::now();
        }
    }

    /// Remove connections idle for longer than `timeout`; returns the count removed
    pub async fn cleanup_inactive(&self, timeout: Duration) -> usize {
        self.cleanup_inactive_at(timeout, Utc::now()).await
    }

    /// [`cleanup_inactive`](Self::cleanup_inactive) evaluated against a given clock
    pub async fn cleanup_inactive_at(&self, timeout: Duration, now: DateTime<Utc>) -> usize {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let stale: Vec<ConnectionId> = self
            .inner
            .lock()
            .connections
            .values()
            .filter(|c| now.signed_duration_since(c.last_activity) > timeout)
            .map(|c| c.id)
            .collect();

        let mut removed = 0;
        for connection_id in stale {
            tracing::info!(connection_id = %connection_id, "Removing inactive connection");
            if self.remove(connection_id, Some(CLOSE_GOING_AWAY)).await {
                removed += 1;
            }
        }

        if removed > 0 {
            ConnectionMetrics::record_inactive_removed(removed as u64);
        }
        removed
    }

    /// Remove every connection, closing each transport with `close_code`
    pub async fn close_all(&self, close_code: u16) -> usize {
        let ids: Vec<ConnectionId> = self.inner.lock().connections.keys().copied().collect();

        let mut closed = 0;
        for connection_id in ids {
            if self.remove(connection_id, Some(close_code)).await {
                closed += 1;
            }
        }
        tracing::info!(closed = closed, "Closed all connections");
        closed
    }

    fn deliver(&self, target: &str, targets: Vec<Target>, frame: &str) -> usize {
        let delivered = targets
            .iter()
            .filter(|(id, transport)| self.write(*id, transport.as_ref(), frame))
            .count();

        DeliveryMetrics::record_delivered(target, delivered as u64);
        tracing::debug!(
            fanout = target,
            recipients = targets.len(),
            delivered = delivered,
            "Fan-out complete"
        );
        delivered
    }

    fn write(&self, connection_id: ConnectionId, transport: &dyn Transport, frame: &str) -> bool {
        match transport.write(frame) {
            Ok(()) => {
                let buffered = transport.buffered_amount();
                if buffered > self.backpressure_threshold {
                    DeliveryMetrics::record_backpressure();
                    tracing::warn!(
                        connection_id = %connection_id,
                        buffered = buffered,
                        "Connection send buffer above threshold"
                    );
                }
                true
            }
            Err(e) => {
                DeliveryMetrics::record_failed();
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to write frame");
                false
            }
        }
    }
}
