use std::sync::Arc;

use actix::prelude::*;
use actix_web::web;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketplace_orders::actors::NotificationHub;
use marketplace_orders::api::{self, AppState};
use marketplace_orders::catalog::{CatalogPort, GuardedCatalog, InMemoryCatalog};
use marketplace_orders::config::AppConfig;
use marketplace_orders::domain::order::{OrderLifecycle, OrderQueries};
use marketplace_orders::domain::pricing::PricingEngine;
use marketplace_orders::messaging::HubPublisher;
use marketplace_orders::metrics::{self, Metrics};
use marketplace_orders::store::{InMemoryOrderStore, OrderRepository};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketplace_orders=debug")),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(?config, "Starting marketplace order service");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // === 2. Catalog (in-memory, optionally seeded) behind timeout + breaker ===
    let memory_catalog = Arc::new(InMemoryCatalog::new());
    if let Some(path) = &config.catalog_seed_path {
        let loaded = memory_catalog.seed_from_file(path).await?;
        tracing::info!(products = loaded, path = %path.display(), "Catalog seeded");
    }
    let catalog: Arc<dyn CatalogPort> = Arc::new(GuardedCatalog::new(
        memory_catalog,
        config.upstream_timeout,
        config.catalog_breaker(),
        metrics.clone(),
    ));

    // === 3. Order store ===
    let store: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderStore::new());

    // === 4. Notification hub actor ===
    let hub = NotificationHub::new(config.subscriber_buffer, metrics.clone()).start();

    // === 5. Lifecycle and queries ===
    let lifecycle = Arc::new(OrderLifecycle::new(
        catalog,
        PricingEngine::new(config.pricing_policy()),
        store.clone(),
        Arc::new(HubPublisher::new(hub.clone())),
        metrics.clone(),
        config.lifecycle_settings(),
    ));
    let queries = Arc::new(OrderQueries::new(store, config.upstream_timeout));

    // === 6. HTTP servers ===
    let state = web::Data::new(AppState {
        lifecycle,
        queries,
        hub,
    });
    let api_server = api::start_api_server(state, config.http_port)?;
    let metrics_server =
        metrics::start_metrics_server(metrics.registry().clone(), config.metrics_port)?;

    futures_util::future::try_join(api_server, metrics_server).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
