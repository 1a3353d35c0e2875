//! cattle-controllers - agent-upgrade and binding-annotation reconcilers

use clap::Parser;
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cattle_controllers::config::Config;
use cattle_controllers::controller_runner;
use cattle_controllers::crd::{binding_crd, setting_crd};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    if config.crd {
        // Generate CRD YAML for clusters without Rancher installed
        for crd in [binding_crd()?, setting_crd()?] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    run_controllers(config).await
}

/// Run every enabled controller until shutdown
async fn run_controllers(config: Config) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    tracing::info!("Starting controllers...");
    let controllers = controller_runner::register(client, &config)?;

    futures::future::join_all(controllers).await;

    tracing::info!("Shutting down");
    Ok(())
}
