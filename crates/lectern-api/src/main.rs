use anyhow::Result;
use lectern_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (_state, router) = lectern_api::setup::initialize_app(config.clone()).await?;

    lectern_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
