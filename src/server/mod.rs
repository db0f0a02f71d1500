//! HTTP API for running the ensemble.
//!
//! - `GET /health`
//! - `GET /api/providers`
//! - `POST /api/ensemble` with `{ "image_base64": ..., "schema": ... }`

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::diagnostics::TracingSink;
use crate::ensemble::EnsembleOrchestrator;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<EnsembleOrchestrator>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::from_orchestrator(config.build_orchestrator(Arc::new(TracingSink)))
    }

    pub fn from_orchestrator(orchestrator: EnsembleOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Start the web server.
pub async fn serve(config: Config, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(&config);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
