use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use nanorelay_core::config::RelayConfig;
use nanorelay_hub::RelayHub;
use nanorelay_upstream::UpstreamClient;

mod app;
mod feeds;
mod http;
mod ws;

/// Relay node confirmation events to WebSocket clients, filtered by account.
#[derive(Debug, Parser)]
#[command(name = "nanorelay-gateway", version)]
struct Cli {
    /// Path to the TOML config file (falls back to NANORELAY_CONFIG, then ./nanorelay.toml).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nanorelay_gateway=info,nanorelay_hub=info,nanorelay_upstream=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > NANORELAY_CONFIG env > ./nanorelay.toml
    let config_path = cli.config.or_else(|| std::env::var("NANORELAY_CONFIG").ok());
    let config = RelayConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RelayConfig::default()
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // filtered channel: the hub needs its sender before the feed can exist
    let (filtered_client, filtered_handle) = UpstreamClient::new("filtered", config.node.clone());
    let hub = Arc::new(RelayHub::new(&config.relay, filtered_handle.sender()));
    let filtered_task = filtered_client.spawn(
        Arc::new(feeds::FilteredFeed { hub: hub.clone() }),
        shutdown_rx.clone(),
    );
    info!(address = %config.node.ws_address, "node client started (filtered)");

    let listen_all_handle = if config.relay.allow_listen_all {
        let (client, handle) = UpstreamClient::new("listen_all", config.node.clone());
        client.spawn(
            Arc::new(feeds::ListenAllFeed { hub: hub.clone() }),
            shutdown_rx.clone(),
        );
        info!(address = %config.node.ws_address, "node client started (all confirmations)");
        Some(handle)
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(
        config,
        hub,
        filtered_handle,
        listen_all_handle,
    ));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Websocket server listening on: ws://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // signal both node clients to stop
    let _ = shutdown_tx.send(true);
    match filtered_task.await {
        Ok(Err(e)) => warn!(error = %e, "filtered node client ended with error"),
        Err(e) => warn!(error = %e, "filtered node client task failed"),
        Ok(Ok(())) => {}
    }
    Ok(())
}
