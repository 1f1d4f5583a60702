//! Web layer module
//!
//! Thin HTTP surface over the pipeline: a health probe and one streaming
//! endpoint that runs the pipeline per request.

use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{config::Config, pipeline::Pipeline};

pub mod handlers;
pub mod responses;

pub use responses::ErrorResponse;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Cancelled on server shutdown; each request runs under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, shutdown: CancellationToken) -> Self {
        Self { pipeline, shutdown }
    }
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let shutdown = state.shutdown.clone();

        Ok(Self {
            app: Self::router(state),
            addr,
            shutdown,
        })
    }

    /// Build the router with all routes and middleware
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .nest("/api/v1", Self::api_v1_routes())
            // Middleware (applied in reverse order)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    fn api_v1_routes() -> Router<AppState> {
        Router::new().route("/documents", get(handlers::stream_documents))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the shutdown token is cancelled
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        tracing::info!("Web server listening on {}", self.addr);

        let shutdown = self.shutdown;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("Web server received cancellation signal, shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}
