//! Login and token refresh against the backend auth endpoints.

use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::proxy::session::{access_token_expiry_millis, Credentials, TokenRecord};
use crate::proxy::upstream::UpstreamClient;

const LOGIN_PATH: &str = "/api/auth/login/";
const REFRESH_PATH: &str = "/auth/refresh-token/";

/// Outcome of a refresh attempt. Expiry of the refresh token itself and a
/// transient backend failure are distinct cases so callers can answer 401
/// versus 502 instead of silently losing the session.
#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed(TokenRecord),
    Expired,
    Transient(String),
}

/// Exchange credentials for an access/refresh token pair.
pub async fn login(
    upstream: &UpstreamClient,
    credentials: &Credentials,
) -> Result<TokenRecord, ProxyError> {
    let body = json!({
        "email": credentials.email,
        "password": credentials.password,
    });

    let response = upstream.post_json_unauthenticated(LOGIN_PATH, &body).await?;

    if response.status() == reqwest::StatusCode::INTERNAL_SERVER_ERROR {
        return Err(ProxyError::ServerError);
    }

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| ProxyError::Internal(format!("login response was not JSON: {}", e)))?;

    if !status.is_success() {
        return Err(ProxyError::AuthenticationError(payload));
    }

    let Some(data) = payload.get("data") else {
        return Err(ProxyError::AuthenticationError(payload));
    };
    let (Some(access_token), Some(refresh_token)) = (
        string_field(data, "access_token"),
        string_field(data, "refresh_token"),
    ) else {
        return Err(ProxyError::AuthenticationError(payload.clone()));
    };

    let access_token_expires = access_token_expiry_millis(&access_token)?;

    Ok(TokenRecord {
        access_token,
        refresh_token,
        access_token_expires,
        email: string_field(data, "email").unwrap_or_default(),
        first_name: string_field(data, "first_name").unwrap_or_default(),
        last_name: string_field(data, "last_name").unwrap_or_default(),
    })
}

/// Exchange the refresh token for a new access token. Profile fields and
/// the refresh token itself are preserved; only the access token and its
/// expiry are replaced.
pub async fn refresh(upstream: &UpstreamClient, record: &TokenRecord) -> RefreshOutcome {
    let body = json!({ "refresh_token": record.refresh_token });

    let response = match upstream.post_json_unauthenticated(REFRESH_PATH, &body).await {
        Ok(response) => response,
        Err(e) => return RefreshOutcome::Transient(format!("refresh request failed: {}", e)),
    };

    let status = response.status();
    if !status.is_success() {
        if status.is_server_error() {
            return RefreshOutcome::Transient(format!("refresh endpoint returned {}", status));
        }
        // 4xx: the backend no longer accepts this refresh token.
        return RefreshOutcome::Expired;
    }

    let payload: Value = match response.json().await {
        Ok(payload) => payload,
        Err(e) => return RefreshOutcome::Transient(format!("refresh response was not JSON: {}", e)),
    };

    let Some(access_token) = payload
        .pointer("/data/access_token")
        .and_then(Value::as_str)
    else {
        return RefreshOutcome::Transient("refresh response missing data.access_token".to_string());
    };

    let access_token_expires = match access_token_expiry_millis(access_token) {
        Ok(expires) => expires,
        Err(e) => return RefreshOutcome::Transient(e.to_string()),
    };

    RefreshOutcome::Refreshed(TokenRecord {
        access_token: access_token.to_string(),
        refresh_token: record.refresh_token.clone(),
        access_token_expires,
        email: record.email.clone(),
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
    })
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}
