// Upstream client

pub mod client;

pub use client::UpstreamClient;
