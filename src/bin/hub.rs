use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use routeros_monitoring::{
    actors::CollectorHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    collection::{CollectionManager, StaticDiscovery},
    config::{Config, read_config_file},
    device::{DeviceRegistry, SshTransportFactory},
    scan::ScanCoordinator,
    storage::{StorageBackend, sqlite::SqliteBackend},
    topology::{TopologyHub, TopologyService},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); defaults apply when omitted
    #[arg(short)]
    file: Option<String>,
}

fn log_filter() -> filter::Targets {
    filter::Targets::new().with_targets(vec![
        ("routeros_monitoring", LevelFilter::DEBUG),
        ("routeros_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ])
}

fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(log_filter())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    let storage: Arc<dyn StorageBackend> = Arc::new(
        SqliteBackend::new(&config.storage.path)
            .await
            .with_context(|| format!("failed to open database {}", config.storage.path.display()))?,
    );

    let registry = DeviceRegistry::new(
        Arc::new(SshTransportFactory),
        config.session.session_config()?,
    );
    for device in &config.devices {
        if let Some(target) = device.ssh_target(config.session.login_suffix.as_deref()) {
            registry.add_device(&device.discovered().device_id(), target).await;
        }
    }

    let discovery = Arc::new(StaticDiscovery::new(
        config.devices.iter().map(|d| d.discovered()).collect(),
    ));
    let hub = TopologyHub::default();

    let manager = CollectionManager::new(
        storage.clone(),
        Arc::new(config.collection.rest_client()?),
        config.collection.settings(config.storage.retention_days),
    )
    .with_fallback(Arc::new(config.collection.snmp_collector()))
    .with_registry(registry.clone())
    .with_discovery(discovery.clone())
    .with_hub(hub.clone());

    let collector = CollectorHandle::spawn(Arc::new(manager), config.collection.interval());
    info!(
        "collecting every {}s from {} configured devices",
        config.collection.interval_secs,
        config.devices.len()
    );

    let scans = ScanCoordinator::new(
        storage.clone(),
        discovery,
        hub.clone(),
        config.collection.network_ranges.clone(),
    );
    let state = ApiState::new(TopologyService::new(storage.clone(), hub), scans)
        .with_collector(collector.clone());
    let api_config = ApiConfig {
        bind_addr: config.api.bind_addr,
        auth_token: config.api.auth_token.clone(),
        enable_cors: config.api.enable_cors,
    };
    let addr = spawn_api_server(api_config, state).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    if let Err(e) = collector.shutdown().await {
        error!("{e}");
    }
    registry.disconnect_all().await;
    storage.close().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_filter_enables_binary_and_library_targets() {
        let filter = log_filter();

        assert!(filter.would_enable(module_path!(), &Level::TRACE));
        assert!(filter.would_enable("routeros_monitoring::collection::manager", &Level::DEBUG));
        assert!(!filter.would_enable("routeros_monitoring", &Level::TRACE));
        assert!(!filter.would_enable("sqlx::query", &Level::INFO));
    }
}
