use opizontas_discovery::{config::Config, server};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    tracing::info!(
        service_name = %config.node.service_name,
        port = config.node.port,
        "Starting discovery node..."
    );
    server::start(config).await?;
    Ok(())
}
