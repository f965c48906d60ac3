//! `DevServer`: Axum HTTP + WebSocket server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use extdev_specs::{SpecificationRegistry, SpecificationSummary};
use extdev_store::PayloadStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::assets::{assets_handler, assets_route};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::preview::announce_previews;
use crate::websocket::broadcast::BroadcastServer;
use crate::websocket::upgrade::extensions_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out of store events to connected clients.
    pub broadcast: Arc<BroadcastServer>,
    /// Payload store handle (read side).
    pub store: PayloadStore,
    /// Loaded extension specifications.
    pub specifications: Arc<SpecificationRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The extension development server.
///
/// Must be created inside a tokio runtime: construction starts the
/// broadcast fan-out task.
pub struct DevServer {
    config: Arc<ServerConfig>,
    store: PayloadStore,
    specifications: Arc<SpecificationRegistry>,
    broadcast: Arc<BroadcastServer>,
    /// Parent of the broadcast, session, listener and announcer tokens.
    /// Only [`DevServer::shutdown`] cancels it, after the broadcast server
    /// has stopped admitting clients.
    cancel: CancellationToken,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl DevServer {
    /// Create a new server broadcasting `store`.
    pub fn new(config: ServerConfig, store: PayloadStore, specifications: Arc<SpecificationRegistry>) -> Self {
        let cancel = CancellationToken::new();
        let broadcast = BroadcastServer::start(
            store.clone(),
            cancel.child_token(),
            config.shutdown_timeout(),
        );
        Self {
            config: Arc::new(config),
            store,
            specifications,
            broadcast,
            cancel,
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broadcast: self.broadcast.clone(),
            store: self.store.clone(),
            specifications: self.specifications.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route(&self.config.ws_path, get(extensions_handler))
            .route(&assets_route(&self.config.ws_path), get(assets_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/specifications", get(specifications_handler));
        if self.config.ws_path != "/" {
            router = router.route("/", get(root_redirect));
        }

        router
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, ws_path = %self.config.ws_path, "dev server listening");

        let _announcer = tokio::spawn(announce_previews(
            self.store.subscribe(),
            Arc::clone(&self.specifications),
            self.public_url(local_addr),
            self.config.store_fqdn.clone().unwrap_or_default(),
            self.cancel.child_token(),
        ));

        let router = self.router();
        let token = self.cancel.child_token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Stop accepting upgrades, close every session, then stop the listener.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.broadcast.shutdown().await;
        if !self.cancel.is_cancelled() {
            info!("dev server stopping");
        }
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.broadcast.is_shutting_down()
    }

    /// Public base URL: the configured one, otherwise `http://<local_addr>`.
    pub fn public_url(&self, local_addr: SocketAddr) -> String {
        self.config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{local_addr}"))
    }

    /// Client URL for the WebSocket endpoint.
    pub fn websocket_url(&self, local_addr: SocketAddr) -> String {
        websocket_url(&self.public_url(local_addr), &self.config.ws_path)
    }

    /// Get the broadcast server.
    pub fn broadcast(&self) -> &Arc<BroadcastServer> {
        &self.broadcast
    }

    /// Get the payload store handle.
    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    /// Get the loaded specifications.
    pub fn specifications(&self) -> &Arc<SpecificationRegistry> {
        &self.specifications
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Derive a WebSocket URL from an HTTP(S) base URL.
///
/// `https://` becomes `wss://`, `http://` (or no scheme) becomes `ws://`.
pub fn websocket_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let host = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base}")
    };
    format!("{host}{path}")
}

/// GET /
async fn root_redirect(State(state): State<AppState>) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, state.config.ws_path.clone())],
    )
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.broadcast.is_shutting_down(),
        state.broadcast.connection_count(),
        state.store.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(&handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /specifications
async fn specifications_handler(State(state): State<AppState>) -> Json<Vec<SpecificationSummary>> {
    Json(
        state
            .specifications
            .list_all()
            .iter()
            .map(|spec| SpecificationSummary::from(spec.as_ref()))
            .collect(),
    )
}
