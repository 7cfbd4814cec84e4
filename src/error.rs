use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure taxonomy for the proxy. Every variant maps to an HTTP status and
/// a structured JSON body; nothing is dropped silently.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid API path")]
    InvalidPath,

    #[error("Request timeout")]
    GatewayTimeout,

    /// Non-success backend response. Relayed with its original status, body
    /// preserved for the caller.
    #[error("Upstream returned {status}")]
    Upstream { status: u16, body: Value },

    /// Auth backend unreachable or answered garbage during a refresh.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Backend login endpoint answered 500.
    #[error("Server error")]
    ServerError,

    /// Backend rejected the credentials. The raw payload is kept for
    /// diagnostics and relayed to the caller.
    #[error("Authentication failed")]
    AuthenticationError(Value),

    #[error("Internal server error")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized | Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidPath => StatusCode::BAD_REQUEST,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::BadGateway(_) | Self::ServerError => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value placed under the `error` key of the response envelope.
    pub fn detail(&self) -> Value {
        match self {
            Self::Upstream { body, .. } => body.clone(),
            Self::AuthenticationError(payload) => payload.clone(),
            // Internal details stay in the logs, not in the response.
            Self::Internal(_) => Value::String("Internal server error".to_string()),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::GatewayTimeout
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!("Internal proxy error: {}", detail);
        }
        (self.status(), Json(json!({ "error": self.detail() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
