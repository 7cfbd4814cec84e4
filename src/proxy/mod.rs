// proxy module - authenticated API reverse proxy

pub mod auth;
pub mod common;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod session;
pub mod upstream;

pub use config::ProxyConfig;
pub use server::AxumServer;
