use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors rejecting a whole translation request before any service is dispatched.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Missing or malformed request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    /// If Some(message), the message is safe to show to the caller.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl TranslateError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::InternalError(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for TranslateError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("Server error ({}): {self}", status.as_u16());
        }

        let message = match &self {
            Self::InternalError(Some(message)) => message.clone(),
            _ => self.to_string(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message,
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// A service could not be resolved to a backend target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The secret the service needs is not available.
    #[error("No API key configured for service '{service_id}' ({key} is not set)")]
    MissingSecret { service_id: String, key: String },

    /// The service id is neither configured nor custom.
    #[error("Unknown translation service '{0}'")]
    UnknownService(String),

    /// The custom service id is not part of the request's custom APIs.
    #[error("Custom service '{0}' was not found in the request's custom APIs")]
    UnknownCustomService(String),
}

/// A target was refused by the endpoint policy. No request was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// The endpoint is not allowed to be called by this server.
    #[error("Endpoint for service '{service_id}' is not authorized: {reason}")]
    UnauthorizedEndpoint { service_id: String, reason: String },
}

/// A single streamed event that could not be decoded. Never fatal.
#[derive(Debug, Error)]
#[error("Failed to decode streamed event: {0}")]
pub(crate) struct DecodeError(pub(crate) String);

/// Everything that can end one service's translation with an error.
///
/// These errors are local to one service and are reported to the client as that service's
/// terminal `error` event. They never reach sibling services.
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The backend answered with a non-success status code.
    #[error("Backend returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// The backend answered with something we cannot interpret, or reported an error in-stream.
    #[error("Unexpected response from backend: {0}")]
    UpstreamResponse(String),

    /// Connection failures, body read failures and timeouts.
    #[error("Connection error: {0}")]
    Transport(String),

    /// The adapter was handed a target it does not serve.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The client went away; nothing is reported.
    #[error("Translation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Security(_) => "security_error",
            Self::UpstreamStatus { .. } | Self::UpstreamResponse(_) => "upstream_error",
            Self::Transport(_) => "transport_error",
            Self::Internal(_) => "internal_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        // Request URLs can carry credentials in their query.
        let error = error.without_url();

        if error.is_timeout() {
            Self::Transport(format!("request timed out: {error}"))
        } else {
            Self::Transport(error.to_string())
        }
    }
}
