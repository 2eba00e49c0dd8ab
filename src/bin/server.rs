//! graph-federation HTTP server binary.
//!
//! Starts an axum HTTP server exposing the federated view of the registered
//! graph endpoints.
//!
//! # Environment Variables
//!
//! - `FEDERATION_CONFIG`: optional YAML config file, loaded before env overrides
//! - `FEDERATED_ADMIN_AUTH`: admin credential required for endpoint changes
//! - `BIND_ADDR` / `PORT`: listen address (default: 0.0.0.0:8080)
//! - `FETCH_TIMEOUT_MS`, `MAX_CONCURRENT_FETCHES`, `REGISTRY_PATH`, `TYPE_REGISTRY_PATH`
//! - `RUST_LOG`: Tracing filter (default: "info,graph_federation=debug")
//!
//! # Usage
//!
//! ```bash
//! FEDERATED_ADMIN_AUTH=FederatedAdmin cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use graph_federation::config::FederationConfig;
use graph_federation::fetcher::HttpCapabilitySource;
use graph_federation::server::{app_router, AppState};
use graph_federation::service::ConfigurationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,graph_federation=debug".into()),
        )
        .init();

    let mut config = match std::env::var("FEDERATION_CONFIG") {
        Ok(path) => FederationConfig::from_yaml_file(std::path::Path::new(&path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => FederationConfig::default(),
    };
    config.apply_env().context("Invalid environment configuration")?;

    let source = HttpCapabilitySource::new().context("Failed to build HTTP client")?;
    let service = ConfigurationService::from_config(&config, Arc::new(source))
        .await
        .context("Failed to start federation")?;

    let snapshot = service.snapshot();
    tracing::info!(
        endpoints = snapshot.statuses.len(),
        reachable = snapshot.reachable_count(),
        "Initial refresh complete"
    );

    let app = app_router(AppState::new(Arc::new(service)));

    tracing::info!("graph-federation server starting on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
