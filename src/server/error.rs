//! HTTP error mapping
//!
//! Every failure leaves the server as `{"success": false, "data": {"message"}}`
//! with a short message; details only go to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

use super::token::TokenError;
use crate::relay::RelayError;

#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::FORBIDDEN,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "data": { "message": self.message }
        });
        (self.status_code, Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        warn!(reason = ?e, "anti-forgery token rejected");
        ApiError::forbidden("Security check failed.")
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        if e.is_validation() {
            return ApiError::bad_request(e.user_message());
        }
        if e.is_configuration() {
            error!(error = %e, "chat assistant is not configured");
        }
        ApiError::internal(e.user_message())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_errors_map_to_status() {
        let validation: ApiError = RelayError::Validation("Message cannot be empty.".into()).into();
        assert_eq!(validation.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(validation.message, "Message cannot be empty.");

        let timeout: ApiError = RelayError::RunTimeout { attempts: 30 }.into();
        assert_eq!(timeout.status_code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(timeout.message, "Assistant response timeout.");

        let token: ApiError = TokenError::Expired.into();
        assert_eq!(token.status_code, StatusCode::FORBIDDEN);
    }
}
