//! Error handling shared by every HTTP surface

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    Authorization { message: String, reason: Option<&'static str> },

    #[error("{message}")]
    Validation { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("{message}")]
    Conflict { message: String, reason: Option<&'static str> },

    #[error("{message}")]
    Gone { message: String, reason: Option<&'static str> },

    #[error("{message}")]
    Unprocessable { message: String, reason: Option<&'static str> },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("{message}")]
    BadRequest { message: String, reason: Option<&'static str> },
}

impl AppError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            reason: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            AppError::Authorization { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Gone { .. } => StatusCode::GONE,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Authentication { .. } => "AUTH_ERROR",
            AppError::Authorization { .. } => "AUTHZ_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Gone { .. } => "GONE",
            AppError::Unprocessable { .. } => "UNPROCESSABLE",
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Machine-readable business reason, when the error carries one.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            AppError::Authorization { reason, .. }
            | AppError::Conflict { reason, .. }
            | AppError::Gone { reason, .. }
            | AppError::Unprocessable { reason, .. }
            | AppError::BadRequest { reason, .. } => *reason,
            _ => None,
        }
    }

    /// Message safe to return to the caller. Backend failures are logged
    /// with their detail and reported generically.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal { .. } => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("API Error: {} - {}", self.error_code(), self);
        } else {
            tracing::debug!("API rejection: {} - {}", self.error_code(), self);
        }

        let error_response = ErrorResponse {
            ok: false,
            error: self.public_message(),
            code: self.error_code().to_string(),
            reason: self.reason().map(str::to_string),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::validation(errors.to_string())
    }
}

// ========================================================================
// EXTRACTOR REJECTIONS
// ========================================================================

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection {
            // Well-formed JSON that does not match the expected shape.
            JsonRejection::JsonDataError(_) => AppError::Unprocessable {
                message,
                reason: Some("invalid_body"),
            },
            _ => AppError::BadRequest {
                message,
                reason: Some("invalid_body"),
            },
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
            reason: Some("invalid_path"),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
            reason: Some("invalid_query"),
        }
    }
}
