use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hitcount::api::create_stats_router;
use hitcount::client::{resolver_from_config, HitDispatcher, StatsClient};
use hitcount::config::Config;
use hitcount::events::{create_events_router, EventService, EventsState};
use hitcount::gateway::{create_gateway_router, GatewayState};
use hitcount::service::HitService;
use hitcount::storage::{self, CachedHitStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let stores = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    // Stats service
    let cached_hits = Arc::new(CachedHitStore::new(
        stores.hits,
        config.stats.cache_max_entries,
        config.stats.cache_ttl_secs,
    ));
    let hit_service = HitService::new(cached_hits, config.stats.clone());
    let stats_router = create_stats_router(hit_service);

    // Stats client used by the event service
    let mut client_config = config.stats_client.clone();
    if client_config.server_url.is_none() && client_config.service_instances.is_empty() {
        info!(
            "No stats instances configured, registering local stats server {}",
            config.stats_server.addr()
        );
        client_config.service_instances = vec![config.stats_server.addr()];
    }
    let resolver = resolver_from_config(&client_config)?;
    let stats_client = Arc::new(StatsClient::new(&client_config, resolver)?);
    let dispatcher = HitDispatcher::spawn(
        Arc::clone(&stats_client),
        client_config.dispatch_buffer_size,
        Duration::from_millis(client_config.dispatch_flush_interval_ms),
    );

    let events_router = create_events_router(EventsState {
        service: EventService::new(stores.events, Arc::clone(&stats_client)),
        dispatcher: dispatcher.clone(),
        client_ip: config.client_ip.clone(),
        app_name: client_config.app_name.clone(),
        stats_service_name: client_config.service_name.clone(),
    });

    let gateway_router = create_gateway_router(GatewayState::new(&config.gateway)?);

    let stats_addr = config.stats_server.addr();
    let stats_listener = tokio::net::TcpListener::bind(&stats_addr).await?;
    info!("Stats server listening on http://{}", stats_addr);

    let events_addr = config.events_server.addr();
    let events_listener = tokio::net::TcpListener::bind(&events_addr).await?;
    info!("Event server listening on http://{}", events_addr);

    let gateway_addr = config.gateway_server.addr();
    let gateway_listener = tokio::net::TcpListener::bind(&gateway_addr).await?;
    info!("Gateway listening on http://{}", gateway_addr);

    tokio::try_join!(
        axum::serve(stats_listener, stats_router).with_graceful_shutdown(shutdown_signal()),
        axum::serve(
            events_listener,
            events_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal()),
        axum::serve(gateway_listener, gateway_router).with_graceful_shutdown(shutdown_signal()),
    )?;

    info!("Servers stopped, flushing pending hits");
    dispatcher.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
