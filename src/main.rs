// src/main.rs
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use ubq_health_monitor::{
    aggregator::{Aggregator, SnapshotRefresher},
    config,
    metrics::MetricsRegistry,
    server::{ApiHandler, MetricsHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ubq_health_monitor=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            config::load_config(&path).await?
        }
        None => config::load_config_or_default("config.yaml").await?,
    };

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Assemble the engine
    let aggregator = Arc::new(Aggregator::from_config(&config, Some(metrics.clone()))?);

    // Start snapshot refresher
    let refresher = Arc::new(SnapshotRefresher::new(
        aggregator.clone(),
        config.aggregator.refresh_interval(),
        config.rate_limit.eviction_interval(),
    ));
    tokio::spawn(refresher.clone().start());

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        let handler = MetricsHandler::new(metrics_registry.clone(), &config.metrics.path);
        info!(
            "Metrics server listening on http://{}{}",
            metrics_addr, config.metrics.path
        );
        tokio::spawn(async move {
            let server = ServerBuilder::new(metrics_addr).with_handler(handler);
            if let Err(e) = server.serve_with_shutdown(std::future::pending()).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // Start API server
    let handler = ApiHandler::new(
        aggregator.clone(),
        &config.discovery.base_domain,
        Some(metrics),
    );
    info!("Starting health monitor on {}", config.server.listen_addr);

    ServerBuilder::new(config.server.listen_addr)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    refresher.shutdown();
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
