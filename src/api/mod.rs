//! HTTP API server for the Parley gateway

pub mod agent;
pub mod error;
pub mod extensions;
pub mod health;
pub mod voice;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::engines::Engines;
use crate::extensions::ExtensionRegistry;
use crate::session::{Pipeline, SessionRegistry};
use crate::voice::VoiceActivity;
use crate::{Config, Result};

pub use error::ApiError;

/// Shared state for API handlers
#[derive(Debug)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
    pub sessions: SessionRegistry,
    pub extensions: ExtensionRegistry,
    pub agents: agent::Agents,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    #[must_use]
    pub const fn engines(&self) -> &Engines {
        self.pipeline.engines()
    }
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    config: Config,
    engines: Engines,
    port: u16,
    static_dir: Option<PathBuf>,
    extensions: Option<ExtensionRegistry>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    ///
    /// Port, static files and extensions default to the values in `config`.
    #[must_use]
    pub fn new(config: Config, engines: Engines) -> Self {
        let port = config.server.port;
        let static_dir = Some(config.server.static_dir.clone());
        Self {
            config,
            engines,
            port,
            static_dir,
            extensions: None,
        }
    }

    /// Override the listening port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the static files directory for serving the web client
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Use pre-loaded extensions instead of scanning the configured directory
    #[must_use]
    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let extensions = self
            .extensions
            .unwrap_or_else(|| ExtensionRegistry::load(&self.config.server.extensions_dir));
        let pipeline = Pipeline::new(self.engines, VoiceActivity::new(self.config.vad_threshold));

        let state = Arc::new(ApiState {
            config: Arc::new(self.config),
            pipeline,
            sessions: SessionRegistry::new(),
            extensions,
            agents: agent::Agents::default(),
            started_at: Utc::now(),
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let api = Router::new()
            .merge(health::router(self.state.clone()))
            .merge(extensions::router(self.state.clone()))
            .merge(voice::router(self.state.clone()))
            .merge(agent::router(self.state.clone()));

        let mut router = Router::new()
            .nest("/api", api)
            .merge(websocket::router(self.state.clone()));

        // Serve static files if the directory exists
        if let Some(static_dir) = self.static_dir.as_ref().filter(|dir| dir.is_dir()) {
            let index_file = static_dir.join("index.html");
            // Unknown paths get the client's index so its router can take over
            let serve_dir = ServeDir::new(static_dir).fallback(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from the web client
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server until ctrl-c
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            extensions = self.state.extensions.len(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
