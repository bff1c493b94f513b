use clap::Parser;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod app;
mod http;

#[derive(Debug, Parser)]
#[command(name = "chatcast-gateway", version, about = "Chat broadcast gateway")]
struct Cli {
    /// Path to chatcast.toml (falls back to CHATCAST_CONFIG, then ~/.chatcast/chatcast.toml).
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port from config.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chatcast_gateway=info,chatcast_hub=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > CHATCAST_CONFIG env > ~/.chatcast/chatcast.toml
    let config_path = cli.config.or_else(|| std::env::var("CHATCAST_CONFIG").ok());
    let mut config = chatcast_core::config::ChatcastConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            chatcast_core::config::ChatcastConfig::default()
        });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!(
        backpressure = ?config.hub.backpressure,
        queue_capacity = config.hub.queue_capacity,
        max_subscribers = ?config.hub.max_subscribers,
        "broadcast hub configured"
    );

    let state = Arc::new(app::AppState::new(config));

    // reap subscriptions nobody drains anymore
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper = state.config.hub.idle_timeout_secs.map(|idle| {
        chatcast_hub::spawn_reaper(
            &state.hub,
            Duration::from_secs(state.config.hub.reap_interval_secs.max(1)),
            Duration::from_secs(idle),
            shutdown_rx,
        )
    });

    let router = app::build_router(Arc::clone(&state));

    info!("chatcast gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    // open /events streams never finish on their own, so stop serving on
    // ctrl-c instead of waiting for connections to drain
    tokio::select! {
        res = axum::serve(listener, router).into_future() => res?,
        _ = shutdown_signal() => {}
    }

    // signal reaper to stop
    let _ = shutdown_tx.send(true);
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    info!("chatcast gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
