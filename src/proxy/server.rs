use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Json},
    routing::{any, get, post},
    Router,
};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::proxy::config::ProxyConfig;
use crate::proxy::handlers;
use crate::proxy::middleware;
use crate::proxy::session::SessionCodec;
use crate::proxy::upstream::UpstreamClient;

/// Axum application state
#[derive(Clone, Debug)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub sessions: SessionCodec,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            upstream: Arc::new(UpstreamClient::new(
                &config.backend_base_url,
                Duration::from_secs(config.request_timeout_secs),
            )),
            sessions: SessionCodec::new(&config.session_secret, config.session_ttl_secs),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::auth::handle_login))
        .route("/api/auth/session", get(handlers::auth::handle_session))
        .route("/proxy", any(handlers::dispatch_proxy_bare))
        .route("/proxy/*path", any(handlers::dispatch_proxy))
        .route("/healthz", get(health_check_handler))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl AxumServer {
    /// Start the proxy server. Returns the instance and the serve task.
    pub async fn start(
        config: ProxyConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let state = AppState::from_config(&config);
        let app = app_router(state);

        let addr = format!("{}:{}", config.get_bind_address(), config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind address {}: {}", addr, e))?;

        tracing::info!("Reverse proxy server started at http://{}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_instance = Self {
            shutdown_tx: Some(shutdown_tx),
        };

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!("Server error: {}", err);
            }
            tracing::info!("Reverse proxy server stopped listening");
        });

        Ok((server_instance, handle))
    }

    /// Stop server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Health check handler
async fn health_check_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}
