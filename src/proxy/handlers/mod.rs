// API endpoint handlers

pub mod auth;
pub mod json;
pub mod multipart;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::proxy::server::AppState;

/// Header carrying a reissued session token after an inline refresh.
pub(crate) const SESSION_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-session-token");

/// Entry point for `/proxy/*path`: multipart submissions go to the form
/// dispatcher, everything else to the JSON dispatcher.
pub async fn dispatch_proxy(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    tracing::info!("Request: {} /proxy/{}", request.method(), path);
    dispatch(state, path, request).await
}

/// `/proxy` with no path segments at all. Method gating and session checks
/// still run first; the empty path is then rejected.
pub async fn dispatch_proxy_bare(State(state): State<AppState>, request: Request) -> Response {
    tracing::info!("Request: {} /proxy", request.method());
    dispatch(state, String::new(), request).await
}

async fn dispatch(state: AppState, path: String, request: Request) -> Response {
    if is_multipart(&request) {
        multipart::handle(state, path, request).await
    } else {
        json::handle(state, path, request)
            .await
            .unwrap_or_else(|err| err.into_response())
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Joins the wildcard capture into a backend path, rejecting empty input.
pub(crate) fn normalize_path(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Attach a reissued session token to an outgoing response.
pub(crate) fn attach_session_token(response: &mut Response, reissued: Option<String>) {
    if let Some(token) = reissued {
        if let Ok(value) = HeaderValue::from_str(&token) {
            response.headers_mut().insert(SESSION_TOKEN_HEADER, value);
        }
    }
}
