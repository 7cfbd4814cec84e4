// Permissive CORS for browser callers.

use tower_http::cors::{Any, CorsLayer};

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        // Reissued session tokens travel in a response header; browsers
        // need it exposed to read it.
        .expose_headers(Any)
}
