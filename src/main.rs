use portico::logger;
use portico::proxy::{AxumServer, ProxyConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logger();

    let config = ProxyConfig::from_env().map_err(anyhow::Error::msg)?;
    let (server, handle) = AxumServer::start(config)
        .await
        .map_err(anyhow::Error::msg)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.stop();
    handle.await?;
    Ok(())
}
