use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::proxy::auth::{self, RefreshOutcome};
use crate::proxy::upstream::UpstreamClient;

/// Login credentials supplied by the caller. Ephemeral, never persisted.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Internal session record. Created on login, replaced in place on refresh,
/// carried inside the signed session token between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch millis, always derived from the access token's `exp` claim.
    pub access_token_expires: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl TokenRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.access_token_expires
    }
}

/// Externally visible session shape. Never carries the refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSession {
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub access_token: String,
}

impl From<&TokenRecord> for PublicSession {
    fn from(record: &TokenRecord) -> Self {
        Self {
            user: PublicUser {
                email: record.email.clone(),
                first_name: record.first_name.clone(),
                last_name: record.last_name.clone(),
                access_token: record.access_token.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    record: TokenRecord,
    /// Session token expiry (epoch seconds), enforced on verification.
    exp: i64,
}

/// Signs and verifies the session tokens handed to callers. The secret is
/// injected here once at startup instead of being read from process-wide
/// state on every call.
#[derive(Clone)]
pub struct SessionCodec {
    secret: String,
    ttl_secs: u64,
}

impl SessionCodec {
    pub fn new(secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    pub fn issue(&self, record: &TokenRecord) -> Result<String, ProxyError> {
        let claims = SessionClaims {
            record: record.clone(),
            exp: Utc::now().timestamp() + self.ttl_secs as i64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ProxyError::Internal(format!("failed to sign session token: {}", e)))
    }

    /// A token that does not verify is simply an unauthenticated caller.
    pub fn verify(&self, token: &str) -> Result<TokenRecord, ProxyError> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ProxyError::Unauthorized)?;
        Ok(data.claims.record)
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Extracts the `exp` claim (as epoch millis) from a JWT without verifying
/// the signature. The backend owns the signing key for its access tokens;
/// only the expiry is needed here.
pub fn access_token_expiry_millis(access_token: &str) -> Result<i64, ProxyError> {
    use base64::Engine;

    let payload = access_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ProxyError::Internal("malformed access token".to_string()))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ProxyError::Internal(format!("access token payload is not base64: {}", e)))?;
    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ProxyError::Internal(format!("access token payload is not JSON: {}", e)))?;
    let exp = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProxyError::Internal("access token has no exp claim".to_string()))?;
    Ok(exp * 1000)
}

/// Freshness check: refresh the record once when the access token has
/// expired. Returns the usable record and, when a refresh happened, a
/// reissued session token for the caller to adopt.
pub async fn ensure_fresh(
    upstream: &UpstreamClient,
    codec: &SessionCodec,
    record: TokenRecord,
) -> Result<(TokenRecord, Option<String>), ProxyError> {
    if !record.is_expired(Utc::now().timestamp_millis()) {
        return Ok((record, None));
    }

    tracing::info!("Access token for {} expired, refreshing", record.email);
    match auth::refresh(upstream, &record).await {
        RefreshOutcome::Refreshed(fresh) => {
            let reissued = codec.issue(&fresh)?;
            Ok((fresh, Some(reissued)))
        }
        RefreshOutcome::Expired => {
            tracing::warn!("Refresh token for {} rejected by backend", record.email);
            Err(ProxyError::Unauthorized)
        }
        RefreshOutcome::Transient(reason) => {
            tracing::error!("Token refresh failed: {}", reason);
            Err(ProxyError::BadGateway("Token refresh failed".to_string()))
        }
    }
}

/// Looks up the session presented in the Authorization header, verifies it
/// and runs the freshness check. Performed fresh on every request; nothing
/// is cached in-process.
pub async fn authorize(
    upstream: &UpstreamClient,
    codec: &SessionCodec,
    headers: &HeaderMap,
) -> Result<(TokenRecord, Option<String>), ProxyError> {
    let token = bearer_token(headers).ok_or(ProxyError::Unauthorized)?;
    let record = codec.verify(token)?;
    if record.access_token.is_empty() {
        // A record without an access token is unauthenticated, whatever
        // else it carries.
        return Err(ProxyError::Unauthorized);
    }
    ensure_fresh(upstream, codec, record).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Builds an unsigned JWT whose payload carries the given `exp` claim.
#[cfg(test)]
pub(crate) fn make_access_token(exp_secs: i64) -> String {
    use base64::Engine;

    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = engine.encode(serde_json::json!({ "exp": exp_secs }).to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
pub(crate) fn sample_record(access_token: &str, expires_ms: i64) -> TokenRecord {
    TokenRecord {
        access_token: access_token.to_string(),
        refresh_token: "refresh-abc".to_string(),
        access_token_expires: expires_ms,
        email: "jo@example.com".to_string(),
        first_name: "Jo".to_string(),
        last_name: "Doe".to_string(),
    }
}
