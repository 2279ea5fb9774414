use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chat_hub_service::config::{LogFormat, LoggingConfig, Settings};
use chat_hub_service::connection_manager::CLOSE_GOING_AWAY;
use chat_hub_service::server::{create_app, AppState};
use chat_hub_service::tasks::InactivitySweeper;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    init_tracing(&settings.logging);
    tracing::info!(run_mode = ?std::env::var("RUN_MODE").ok(), "Configuration loaded");

    // Create application state
    let state = AppState::in_memory(settings.clone());
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start inactivity sweeper in background
    let sweeper_handle = if settings.websocket.cleanup_enabled {
        let sweeper = InactivitySweeper::new(
            settings.websocket.clone(),
            state.connection_manager.clone(),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(async move {
            sweeper.run().await;
        }))
    } else {
        tracing::info!("Inactivity sweeper disabled");
        None
    };

    let connection_manager = state.connection_manager.clone();

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    let closed = connection_manager.close_all(CLOSE_GOING_AWAY).await;
    tracing::info!(closed = closed, "Connections closed");

    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop background tasks
    let _ = shutdown_tx.send(());
}
