//! Error taxonomy shared by every crate that can fail at the core's
//! boundary. Library crates wrap these in their own
//! `thiserror` enums where they need extra variants; the server maps
//! `CoreError` to HTTP status codes and WS error frames.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("llm bad request: {0}")]
    LlmBadRequest(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Stable category tag used for logging/notification payloads;
    /// `labeling-server` maps these to concrete HTTP status codes.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::ValidationError(_) => "validation_error",
            CoreError::ParseError(_) => "parse_error",
            CoreError::Unauthorized => "unauthorized",
            CoreError::LlmBadRequest(_) => "llm_bad_request",
            CoreError::BudgetExceeded(_) => "budget_exceeded",
            CoreError::Cancelled => "cancelled",
            CoreError::InternalError(_) => "internal_error",
        }
    }
}
