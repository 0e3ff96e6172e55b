use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::validate::ValidationIssue;

/// Error taxonomy shared by the HTTP layer, the webhook processor, and the
/// outbound send worker. The variant names are the categories from the
/// error-handling design, not incidental implementation types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationIssue>),

    #[error("authentication required")]
    Authn,

    #[error("forbidden: {0}")]
    Authz(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },

    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("internal error")]
    Fatal(#[source] anyhow::Error),
}

impl AppError {
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation(issues)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn authz(what: impl Into<String>) -> Self {
        Self::Authz(what.into())
    }

    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True when a job processing this error should be retried rather than
    /// marked terminally failed (§7 propagation policy).
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Transient(_) | AppError::Provider { .. })
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authn => StatusCode::UNAUTHORIZED,
            AppError::Authz(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self, "fatal error serving request");
        }
        let details = match &self {
            AppError::Validation(issues) => Some(serde_json::json!(issues)),
            _ => None,
        };
        let body = ErrorBody {
            message: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
