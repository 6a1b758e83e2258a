use realfeel_temperature::home_assistant::HomeAssistantAPI;
use realfeel_temperature::{BridgeCoordinator, BridgeSettings};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting RealFeel temperature bridge");
    let settings = BridgeSettings::from_env();
    let coordinator = BridgeCoordinator::new(settings, HomeAssistantAPI::new());

    tokio::select! {
        result = coordinator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
