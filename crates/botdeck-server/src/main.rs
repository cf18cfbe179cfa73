mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use botdeck_api::auth::{AppState, AppStateInner};
use botdeck_api::credentials::CredentialStore;
use botdeck_api::delivery;
use botdeck_api::ledger::Ledger;
use botdeck_api::process::LoggingProcessControl;
use botdeck_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botdeck_server=debug,botdeck_api=debug,botdeck_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let ledger = Arc::new(Ledger::new(
        db,
        CredentialStore::new(&config.upload_dir),
        Arc::new(LoggingProcessControl),
    ));

    let resumed = delivery::resume_pending(&ledger, config.delivery_delay)?;
    if resumed > 0 {
        info!("Resumed {} pending message deliveries", resumed);
    }

    let state: AppState = Arc::new(AppStateInner {
        ledger,
        delivery_delay: config.delivery_delay,
    });

    let index = config.public_dir.join("index.html");
    let static_files = ServeDir::new(&config.public_dir).fallback(ServeFile::new(index));

    let app = Router::new()
        .nest("/api", botdeck_api::router(state))
        .route("/health", get(|| async { "ok" }))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Botdeck server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
