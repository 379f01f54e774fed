//! Switchyard server library.
//!
//! Provides a reusable serve function wiring configuration into the chat
//! gateway, the files subsystem, authentication, and health — for the
//! binary and for integration tests.

#![deny(missing_docs)]

mod auth;

use std::net::SocketAddr;

use anyhow::anyhow;
use auth::AuthLayer;
use axum::{Json, Router, routing::get};
use config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address the server binds to.
    pub listen_address: SocketAddr,
    /// The deserialized TOML configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Optional oneshot sender for the bound address (useful with port 0).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let mut app = Router::new();

    // Credentials and clients first, then the orchestrator, then routes.
    let file_store = match &config.files {
        Some(files_config) => {
            let fallback_region = config.llm.bedrock.as_ref().map(|bedrock| bedrock.region.as_str());
            Some(files::build_store(files_config, fallback_region).await)
        }
        None => None,
    };

    let gateway = llm::build_server(&config, file_store.clone())
        .await
        .map_err(|e| anyhow!("Failed to initialize chat gateway: {e}"))?;

    let auth = AuthLayer::new(config.server.api_key.clone());
    let cors = CorsLayer::permissive();

    let mut v1 = llm::router(gateway);

    if let Some(store) = file_store {
        v1 = v1.merge(files::router(store));
        log::info!("Files endpoint: http://{listen_address}/v1/files");
    }

    app = app.merge(v1.layer(tower::ServiceBuilder::new().layer(cors.clone()).layer(auth)));

    // The bare liveness route stays outside authentication.
    if config.server.health.enabled {
        let health_router = Router::new()
            .route(&config.server.health.path, get(health))
            .layer(cors);

        app = app.merge(health_router);
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .map_err(|_| anyhow!("Failed to send back bound address"))?;
    }

    log::info!("Chat endpoint: http://{listen_address}/v1/chat/completions");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("Received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

/// Overall liveness.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}
