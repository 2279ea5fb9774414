pub mod api;
pub mod auth;
pub mod config;
pub mod connection_manager;
pub mod error;
pub mod metrics;
pub mod presence;
pub mod server;
pub mod services;
pub mod tasks;
pub mod websocket;
