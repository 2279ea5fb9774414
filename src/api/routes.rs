use axum::{routing::get, Router};

use crate::server::AppState;

use super::connection::{get_connection, get_presence};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/connections/{id}", get(get_connection))
                .route("/users/{user_id}/presence", get(get_presence)),
        )
}
