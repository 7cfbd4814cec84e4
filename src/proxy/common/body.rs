// Content-type-aware reading of backend response bodies.

use reqwest::header;
use serde_json::Value;

use crate::error::ProxyError;

/// A backend response body, parsed as JSON when the backend declared it so,
/// kept as raw text otherwise.
#[derive(Debug)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
}

impl UpstreamBody {
    /// Collapse into a JSON value; text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

/// Reads the response body, sniffing the declared content type.
pub async fn read_body(response: reqwest::Response) -> Result<UpstreamBody, ProxyError> {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    if is_json {
        Ok(UpstreamBody::Json(response.json().await?))
    } else {
        Ok(UpstreamBody::Text(response.text().await?))
    }
}
