mod settings;

pub use settings::{
    ChatConfig, JwtConfig, LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
