use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::generate::GenerateError;
use crate::oauth::OAuthError;

/// Unified HTTP error type. Rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// An upstream service failed; `status` is what the client receives.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn upstream(status: Option<u16>, message: String) -> Self {
        let status = status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        Self::Upstream { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        let message = err.to_string();
        match err {
            OAuthError::ProviderDenied(_)
            | OAuthError::InvalidRequest(_)
            | OAuthError::InvalidOrExpiredState => Self::BadRequest(message),

            OAuthError::NotAuthenticated => Self::Unauthorized(message),

            // No refresh token on record: the operator must reconnect.
            OAuthError::RefreshFailed { status: None, .. } => Self::Unauthorized(message),

            // Refresh rejected upstream: pass the token endpoint's status through.
            OAuthError::RefreshFailed { status, .. } => Self::upstream(status, message),

            OAuthError::UpstreamExchangeFailed { .. }
            | OAuthError::UpstreamCallFailed { .. }
            | OAuthError::Http(_) => Self::upstream(None, message),

            OAuthError::Misconfigured(_) | OAuthError::Storage(_) => Self::Internal(message),
        }
    }
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        let message = err.to_string();
        match err {
            GenerateError::Misconfigured(_) => Self::Internal(message),
            GenerateError::Api { .. }
            | GenerateError::InvalidResponse(_)
            | GenerateError::Http(_) => Self::upstream(None, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_status_mapping() {
        let cases = [
            (OAuthError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (OAuthError::InvalidOrExpiredState, StatusCode::BAD_REQUEST),
            (
                OAuthError::Misconfigured("Missing X client configuration".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                OAuthError::RefreshFailed {
                    status: None,
                    message: "No refresh token available".into(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                OAuthError::RefreshFailed {
                    status: Some(400),
                    message: "Token refresh failed: 400 invalid_grant".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                OAuthError::UpstreamCallFailed {
                    status: 403,
                    body: "nope".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_generate_status_mapping() {
        assert_eq!(
            AppError::from(GenerateError::Misconfigured("OPENAI_API_KEY is missing".into()))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(GenerateError::InvalidResponse("empty".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_message_is_preserved() {
        let err = AppError::from(OAuthError::RefreshFailed {
            status: None,
            message: "No refresh token available".into(),
        });
        assert_eq!(err.to_string(), "No refresh token available");
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = AppError::BadRequest("tweetText is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "tweetText is required" }));
    }
}
