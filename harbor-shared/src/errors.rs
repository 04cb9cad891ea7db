use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{service}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E2xxx: Messaging errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    ServiceUnavailable,
    BadRequest,
    PayloadTooLarge,

    // Auth (E1xxx)
    TokenExpired,
    TokenInvalid,

    // Messaging (E2xxx)
    ConversationNotFound,
    NotConversationMember,
    NotConversationAdmin,
    MessageNotFound,
    UserNotFound,
    UserBlocked,
    GroupNameInvalid,
    GroupCapacity,
    AlreadyMember,
    NotGroupConversation,
    SelfConversation,
    MessageEmpty,
    MediaUploadFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",
            Self::ServiceUnavailable => "E0007",
            Self::BadRequest => "E0008",
            Self::PayloadTooLarge => "E0009",

            // Auth
            Self::TokenExpired => "E1001",
            Self::TokenInvalid => "E1002",

            // Messaging
            Self::ConversationNotFound => "E2001",
            Self::NotConversationMember => "E2002",
            Self::NotConversationAdmin => "E2003",
            Self::MessageNotFound => "E2004",
            Self::UserNotFound => "E2005",
            Self::UserBlocked => "E2006",
            Self::GroupNameInvalid => "E2007",
            Self::GroupCapacity => "E2008",
            Self::AlreadyMember => "E2009",
            Self::NotGroupConversation => "E2010",
            Self::SelfConversation => "E2011",
            Self::MessageEmpty => "E2012",
            Self::MediaUploadFailed => "E2013",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest | Self::GroupNameInvalid
            | Self::GroupCapacity | Self::AlreadyMember | Self::NotGroupConversation
            | Self::SelfConversation | Self::MessageEmpty | Self::MediaUploadFailed => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::ConversationNotFound | Self::MessageNotFound
            | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden | Self::NotConversationMember | Self::NotConversationAdmin
            | Self::UserBlocked => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Error code of this error as reported in the response envelope.
    pub fn code_str(&self) -> &'static str {
        match self {
            Self::Known { code, .. } => code.code(),
            Self::Internal(_) => ErrorCode::InternalError.code(),
            Self::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound.code(),
            Self::Database(_) => ErrorCode::InternalError.code(),
            Self::Validation(_) => ErrorCode::ValidationError.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => (
                        StatusCode::CONFLICT,
                        ApiErrorResponse::new("E0008", "resource already exists"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_family_maps_to_400() {
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::GroupNameInvalid,
            ErrorCode::GroupCapacity,
            ErrorCode::AlreadyMember,
            ErrorCode::NotGroupConversation,
            ErrorCode::SelfConversation,
            ErrorCode::MessageEmpty,
        ] {
            assert_eq!(code.status_code(), StatusCode::BAD_REQUEST, "{:?}", code);
        }
    }

    #[test]
    fn access_family_maps_to_403() {
        for code in [
            ErrorCode::Forbidden,
            ErrorCode::NotConversationMember,
            ErrorCode::NotConversationAdmin,
            ErrorCode::UserBlocked,
        ] {
            assert_eq!(code.status_code(), StatusCode::FORBIDDEN, "{:?}", code);
        }
    }

    #[test]
    fn missing_family_maps_to_404() {
        for code in [
            ErrorCode::ConversationNotFound,
            ErrorCode::MessageNotFound,
            ErrorCode::UserNotFound,
        ] {
            assert_eq!(code.status_code(), StatusCode::NOT_FOUND, "{:?}", code);
        }
    }

    #[test]
    fn codes_are_unique() {
        let all = [
            ErrorCode::InternalError,
            ErrorCode::ValidationError,
            ErrorCode::NotFound,
            ErrorCode::Unauthorized,
            ErrorCode::Forbidden,
            ErrorCode::RateLimited,
            ErrorCode::ServiceUnavailable,
            ErrorCode::BadRequest,
            ErrorCode::PayloadTooLarge,
            ErrorCode::TokenExpired,
            ErrorCode::TokenInvalid,
            ErrorCode::ConversationNotFound,
            ErrorCode::NotConversationMember,
            ErrorCode::NotConversationAdmin,
            ErrorCode::MessageNotFound,
            ErrorCode::UserNotFound,
            ErrorCode::UserBlocked,
            ErrorCode::GroupNameInvalid,
            ErrorCode::GroupCapacity,
            ErrorCode::AlreadyMember,
            ErrorCode::NotGroupConversation,
            ErrorCode::SelfConversation,
            ErrorCode::MessageEmpty,
            ErrorCode::MediaUploadFailed,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn database_not_found_reports_e0003() {
        let err = AppError::Database(diesel::result::Error::NotFound);
        assert_eq!(err.code_str(), "E0003");
    }
}
