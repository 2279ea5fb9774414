use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Close the socket when no frame arrives for this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Seconds between server pings; capped at half the idle timeout
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Maximum inbound frame size in bytes
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    /// Outbound frames buffered per connection before writes start failing
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
    /// Registry inactivity threshold in seconds for the cleanup sweep
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: u64,
    /// Cleanup sweep interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    #[serde(default = "default_cleanup_enabled")]
    pub cleanup_enabled: bool,
    /// Buffered outbound frames above which a backpressure warning is logged
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: usize,
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_max_payload() -> usize {
    16 * 1024 * 1024
}

fn default_send_buffer() -> usize {
    64
}

fn default_inactivity_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_backpressure_threshold() -> usize {
    48
}

fn default_max_message_length() -> usize {
    4000
}

fn default_search_limit() -> usize {
    20
}

fn default_max_search_limit() -> usize {
    100
}

fn default_history_limit() -> usize {
    50
}

fn default_max_history_limit() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("websocket.idle_timeout", default_idle_timeout() as i64)?
            .set_default("websocket.heartbeat_interval", default_heartbeat_interval() as i64)?
            .set_default("websocket.inactivity_timeout", default_inactivity_timeout() as i64)?
            .set_default("websocket.cleanup_interval", default_cleanup_interval() as i64)?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CHAT__JWT__SECRET, CHAT__SERVER__PORT, CHAT__WEBSOCKET__IDLE_TIMEOUT, ...
            .add_source(
                Environment::with_prefix("CHAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WebSocketConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout)
    }

    /// Never zero: a zero period would make the sweep timer panic
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }

    /// Ping period that keeps a quiet client inside the idle timeout, at least 1s
    pub fn heartbeat_interval(&self) -> Duration {
        let secs = self.heartbeat_interval.min(self.idle_timeout / 2).max(1);
        Duration::from_secs(secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
            max_payload: default_max_payload(),
            send_buffer: default_send_buffer(),
            inactivity_timeout: default_inactivity_timeout(),
            cleanup_interval: default_cleanup_interval(),
            cleanup_enabled: default_cleanup_enabled(),
            backpressure_threshold: default_backpressure_threshold(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            default_search_limit: default_search_limit(),
            max_search_limit: default_max_search_limit(),
            default_history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
