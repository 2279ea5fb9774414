//! API layer - operational HTTP endpoints.

mod connection;
mod health;
mod metrics;
mod routes;

pub use connection::{get_connection, get_presence};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
