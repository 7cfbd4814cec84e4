use serde::{Deserialize, Serialize};

/// Reverse proxy service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether LAN access is allowed
    /// - false: local access only, binds 127.0.0.1 (default)
    /// - true: binds 0.0.0.0
    #[serde(default)]
    pub allow_lan_access: bool,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the backend REST API, without trailing slash
    pub backend_base_url: String,

    /// Shared secret used to sign and verify session tokens
    pub session_secret: String,

    /// Lifetime of an issued session token (seconds)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Upstream request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    8046
}

fn default_session_ttl() -> u64 {
    // 30 days, matching the lifetime of the login session
    30 * 24 * 60 * 60
}

fn default_request_timeout() -> u64 {
    30
}

impl ProxyConfig {
    /// Load configuration from `PORTICO_*` environment variables. The
    /// backend base URL and the session secret are required, everything
    /// else falls back to defaults.
    pub fn from_env() -> Result<Self, String> {
        let backend_base_url = std::env::var("PORTICO_BACKEND_URL")
            .map_err(|_| "PORTICO_BACKEND_URL is not set".to_string())?;
        let session_secret = std::env::var("PORTICO_SESSION_SECRET")
            .map_err(|_| "PORTICO_SESSION_SECRET is not set".to_string())?;

        Ok(Self {
            allow_lan_access: env_parse("PORTICO_ALLOW_LAN", false)?,
            port: env_parse("PORTICO_PORT", default_port())?,
            backend_base_url: backend_base_url.trim_end_matches('/').to_string(),
            session_secret,
            session_ttl_secs: env_parse("PORTICO_SESSION_TTL_SECS", default_session_ttl())?,
            request_timeout_secs: env_parse(
                "PORTICO_REQUEST_TIMEOUT_SECS",
                default_request_timeout(),
            )?,
        })
    }

    /// Resolve the actual bind address
    /// - allow_lan_access = false: "127.0.0.1" (default, privacy first)
    /// - allow_lan_access = true: "0.0.0.0"
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
