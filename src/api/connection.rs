//! Connection and presence lookups.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::{ConnectionId, ConnectionInfo};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::services::UserStatus;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub status: UserStatus,
    pub online: bool,
    pub connection_count: usize,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

/// GET /api/v1/connections/{id}
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<ConnectionId>,
) -> Result<Json<ConnectionInfo>> {
    state
        .connection_manager
        .get_info(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))
}

/// GET /api/v1/users/{user_id}/presence
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceResponse>> {
    let user = state
        .services
        .users
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    let connection_count = state.connection_manager.user_connection_ids(&user_id).len();
    let status = state.connection_manager.user_status(&user_id).await;

    Ok(Json(PresenceResponse {
        user_id,
        status,
        online: connection_count > 0,
        connection_count,
        last_seen: user.last_seen,
    }))
}
