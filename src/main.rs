use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use ara_messaging_service::config::Settings;
use ara_messaging_service::server::{create_app, AppState};
use ara_messaging_service::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    let state = AppState::new(settings.clone()).await?;
    tracing::info!(
        cluster = state.router.is_some(),
        "Application state initialized"
    );

    let registry = state.registry.clone();
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Connections still open after the listener stopped
    let remaining = registry.all();
    for session in &remaining {
        session.close();
    }
    tracing::info!(sessions = remaining.len(), "Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install terminate handler");
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
}
