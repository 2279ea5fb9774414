use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Failure raised by an external collaborator (user store, chat, contacts, files,
/// session verification). Domain refusals are expressed as `None`/`false`, never as
/// a `ServiceError`.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Inconsistent data: {0}")]
    Inconsistent(String),
}

/// Error codes carried in outbound `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessageFormat,
    UnknownMessageType,
    AuthenticationRequired,
    AuthenticationFailed,
    PermissionDenied,
    UserNotFound,
    MessageNotFound,
    ConversationNotFound,
    ContactRequestFailed,
    ContactRemovalFailed,
    BlockFailed,
    UnblockFailed,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessageFormat => "INVALID_MESSAGE_FORMAT",
            Self::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::MessageNotFound => "MESSAGE_NOT_FOUND",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::ContactRequestFailed => "CONTACT_REQUEST_FAILED",
            Self::ContactRemovalFailed => "CONTACT_REMOVAL_FAILED",
            Self::BlockFailed => "BLOCK_FAILED",
            Self::UnblockFailed => "UNBLOCK_FAILED",
            Self::ServerError => "SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Service(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Service temporarily unavailable".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_ERROR", client_msg, log_msg)
            }
        };

        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_wire_code() {
        let json = serde_json::to_string(&ErrorCode::AuthenticationRequired).unwrap();
        assert_eq!(json, "\"AUTHENTICATION_REQUIRED\"");
        assert_eq!(ErrorCode::InvalidMessageFormat.as_str(), "INVALID_MESSAGE_FORMAT");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("connection".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
