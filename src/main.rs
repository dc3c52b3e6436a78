//! Depth Ladder - feed service
//!
//! Subscribes to the `book_ui_1` feed, maintains the local order book and
//! publishes the depth-annotated ladder to the presentation process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::{mpsc, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depth_ladder::{AppState, BookState, Config, FeedCommand, FeedManager, FeedMetrics, OrderBook, Publisher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Depth Ladder feed");

    let config = Arc::new(Config::load()?);
    info!(
        product = %config.product,
        visible_rows = config.visible_rows,
        depth_policy = ?config.depth_policy,
        "Configuration loaded"
    );

    let metrics = FeedMetrics::register(prometheus::default_registry())?;
    let book = Arc::new(RwLock::new(OrderBook::new(config.product.as_str())));
    let publisher = Arc::new(Publisher::new(&config.ipc_socket_path).await?);
    let (commands, command_rx) = mpsc::channel(32);

    let state = Arc::new(AppState {
        book,
        publisher,
        config: config.clone(),
        metrics,
        commands: commands.clone(),
    });

    // Start health check server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Periodic status logging
    let status_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(
            status_state.config.health_check_interval_secs.max(1),
        ));
        loop {
            ticker.tick().await;
            let book = status_state.book.read().await;
            let book_state = book.state(status_state.config.visible_rows, status_state.config.depth_policy);
            if let Some(spread) = book_state.metrics.spread {
                info!(
                    product = %book_state.product,
                    best_bid = ?book_state.metrics.best_bid,
                    best_ask = ?book_state.metrics.best_ask,
                    spread = spread,
                    spread_pct = ?book_state.metrics.spread_pct,
                    "Order book status"
                );
            }
        }
    });

    // Shut down cleanly on Ctrl-C
    let shutdown = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown.send(FeedCommand::Shutdown).await;
        }
    });

    commands.send(FeedCommand::Connect).await?;

    let mut manager = FeedManager::new(state, command_rx);
    manager.run().await?;

    info!("Depth Ladder feed stopped");
    Ok(())
}

/// Start HTTP server for health checks, metrics, the current book and feed control
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/book", get(book))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/background", post(background))
        .route("/toggle", post(toggle))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let book = state.book.read().await;
    Json(serde_json::json!({
        "status": "healthy",
        "component": "depth-ladder",
        "product": book.product(),
        "initialized": book.is_initialized(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> Result<String, StatusCode> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn book(State(state): State<Arc<AppState>>) -> Json<BookState> {
    let book = state.book.read().await;
    Json(book.state(state.config.visible_rows, state.config.depth_policy))
}

async fn send_command(state: &AppState, command: FeedCommand) -> StatusCode {
    match state.commands.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn connect(State(state): State<Arc<AppState>>) -> StatusCode {
    send_command(&state, FeedCommand::Connect).await
}

async fn disconnect(State(state): State<Arc<AppState>>) -> StatusCode {
    send_command(&state, FeedCommand::Disconnect).await
}

async fn background(State(state): State<Arc<AppState>>) -> StatusCode {
    send_command(&state, FeedCommand::Background).await
}

async fn toggle(State(state): State<Arc<AppState>>) -> StatusCode {
    send_command(&state, FeedCommand::ToggleProduct).await
}
