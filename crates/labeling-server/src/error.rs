use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use labeling_types::CoreError;

/// Maps every failure mode the handlers produce onto a status code plus a
/// stable `error` category string, so clients can branch on the category
/// without parsing the human-readable `message`.
pub struct ApiError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            category: "not_found",
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            category: "validation_error",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            category: "internal_error",
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::ValidationError(_) | CoreError::ParseError(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::LlmBadRequest(_) => StatusCode::BAD_GATEWAY,
            CoreError::BudgetExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::Cancelled => StatusCode::CONFLICT,
            CoreError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            category: err.category(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.category, "message": self.message })),
        )
            .into_response()
    }
}
