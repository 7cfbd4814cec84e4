// Login and session endpoints.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::ProxyError;
use crate::proxy::auth;
use crate::proxy::server::AppState;
use crate::proxy::session::{self, Credentials, PublicSession};

/// POST /api/auth/login - exchange credentials for a session token and the
/// public session view.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ProxyError> {
    let record = auth::login(&state.upstream, &credentials).await?;
    let token = state.sessions.issue(&record)?;

    tracing::info!("Login succeeded for {}", record.email);

    let session = PublicSession::from(&record);
    Ok(Json(json!({ "token": token, "user": session.user })).into_response())
}

/// GET /api/auth/session - materialize the session behind the presented
/// token. The refresh token never appears in the response.
pub async fn handle_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let (record, reissued) =
        session::authorize(&state.upstream, &state.sessions, &headers).await?;

    let mut reply = Json(PublicSession::from(&record)).into_response();
    super::attach_session_token(&mut reply, reissued);
    Ok(reply)
}
