// JSON proxy dispatcher: forwards JSON-bodied requests to the backend and
// relays the response.

use axum::{
    body::to_bytes,
    extract::Request,
    http::Method,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;

use crate::error::ProxyError;
use crate::proxy::common::body::{read_body, UpstreamBody};
use crate::proxy::common::query::remap_query;
use crate::proxy::server::AppState;
use crate::proxy::session;

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

pub(super) async fn handle(
    state: AppState,
    path: String,
    request: Request,
) -> Result<Response, ProxyError> {
    let method = request.method().clone();
    if !ALLOWED_METHODS.contains(&method) {
        return Err(ProxyError::MethodNotAllowed(method.to_string()));
    }

    let (record, reissued) =
        session::authorize(&state.upstream, &state.sessions, request.headers()).await?;

    let api_path = normalize(&path)?;
    let query = remap_query(request.uri().query());

    let body = if method == Method::GET {
        None
    } else {
        read_json_body(request).await?
    };

    let response = state
        .upstream
        .send_json(method, &api_path, &query, &record.access_token, body.as_ref())
        .await?;

    let status = response.status();
    let payload = read_body(response).await?;

    let mut reply = if status.is_success() {
        match payload {
            // JSON payloads are relayed at the top level of the response.
            UpstreamBody::Json(value) => (status, Json(value)).into_response(),
            // Text payloads are relayed as-is, never wrapped.
            UpstreamBody::Text(text) => (status, text).into_response(),
        }
    } else {
        ProxyError::Upstream {
            status: status.as_u16(),
            body: payload.into_value(),
        }
        .into_response()
    };

    super::attach_session_token(&mut reply, reissued);
    Ok(reply)
}

fn normalize(path: &str) -> Result<String, ProxyError> {
    super::normalize_path(path).ok_or(ProxyError::InvalidPath)
}

async fn read_json_body(request: Request) -> Result<Option<Value>, ProxyError> {
    let bytes = to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| ProxyError::Internal(format!("failed to read request body: {}", e)))?;

    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ProxyError::Internal(format!("request body is not JSON: {}", e)))
}
