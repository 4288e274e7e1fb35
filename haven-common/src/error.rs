//! Error types for Haven.

use thiserror::Error;

/// Result type alias using the Haven error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Haven services.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The text-generation backend is not loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::ModelUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to return to API clients, without the variant prefix.
    pub fn client_message(&self) -> &str {
        match self {
            Self::InvalidInput(m) | Self::ModelUnavailable(m) | Self::Internal(m) => m,
        }
    }
}

#[cfg(feature = "axum")]
mod response {
    use super::Error;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    };

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = serde_json::json!({ "error": self.client_message() });
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::InvalidInput("test".into()).status_code(), 400);
        assert_eq!(Error::ModelUnavailable("test".into()).status_code(), 503);
        assert_eq!(Error::Internal("test".into()).status_code(), 500);
    }

    #[test]
    fn test_client_message_is_unprefixed() {
        let err = Error::ModelUnavailable("Model not loaded. Please restart the server.".into());
        assert_eq!(err.client_message(), "Model not loaded. Please restart the server.");
        assert!(err.to_string().starts_with("Model unavailable: "));
    }

    #[cfg(feature = "axum")]
    #[tokio::test]
    async fn test_into_response_renders_error_json() {
        use axum::response::IntoResponse;

        let response = Error::Internal("boom".into()).into_response();
        assert_eq!(response.status().as_u16(), 500);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }
}
