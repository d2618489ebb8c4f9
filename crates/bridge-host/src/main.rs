use bridge_host::config::HostConfig;
use bridge_host::BridgeHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = if let Ok(path) = std::env::var("BRIDGE_CONFIG_PATH") {
        HostConfig::from_toml(path)?
    } else {
        HostConfig::from_env()?
    };

    let host = BridgeHost::new(config)?;
    host.start().await?;

    Ok(())
}
