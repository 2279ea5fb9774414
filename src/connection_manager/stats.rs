//! Connection statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ConnectionId;

/// Registry occupancy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub authenticated: usize,
    pub anonymous: usize,
    pub unique_users: usize,
    pub active_rooms: usize,
}

/// Point-in-time view of one connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub authenticated: bool,
    pub connected_at: DateTime<Utc>,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub rooms: Vec<String>,
    pub buffered_amount: usize,
}
