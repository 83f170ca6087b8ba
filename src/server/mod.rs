//! HTTP Server
//!
//! Accepts WebSocket upgrades on the configured path and hands each socket to
//! a relay session. Without a valid accepted identity every request is
//! refused with a fixed 401 page.

pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AcceptedIdentity;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::relay::{Connector, TcpConnector};
use crate::Result;

pub const METRICS_PATH: &str = "/metrics";

const UNAUTHORIZED_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>401 - UUID Not Valid</title>
</head>
<body>
    <h1 style="color: red;">Not set valid UUID in Environment Variables.</h1>
    <h2>Generate a UUID, set it as the UUID environment variable (or auth.uuid in the config file) and restart.</h2>
    <h3>Clients must use the same UUID to connect.</h3>
</body>
</html>"#;

const STATUS_PAGE: &str = r#"<html>
  <body>
    <h1>Vless Proxy is running</h1>
    <p>WebSocket proxy is ready. Use your VLESS client to connect.</p>
  </body>
</html>"#;

/// Shared state for all connections
pub struct AppState {
    /// `None` when the configured UUID is missing or malformed
    pub identity: Option<AcceptedIdentity>,
    pub connector: Arc<dyn Connector>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            identity: config.accepted_identity(),
            connector: Arc::new(TcpConnector::from_config(config)),
            metrics,
        }
    }
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler).fallback(method_fallback_handler))
        .route(METRICS_PATH, get(metrics_handler))
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let identity = match &state.identity {
        Some(identity) => identity.clone(),
        None => return unauthorized(),
    };

    match upgrade {
        Some(upgrade) => {
            let state = Arc::clone(&state);
            upgrade.on_upgrade(move |socket| ws::handle_socket(socket, state, identity))
        }
        None => Html(STATUS_PAGE).into_response(),
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}

async fn fallback_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.identity.is_none() {
        return unauthorized();
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Other methods on `ws_path`: still refused outright without an identity
async fn method_fallback_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.identity.is_none() {
        return unauthorized();
    }
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Html(UNAUTHORIZED_PAGE)).into_response()
}

/// The relay's HTTP front end
pub struct VlessServer {
    bind_addr: SocketAddr,
    ws_path: String,
    state: Arc<AppState>,
}

impl VlessServer {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self::with_state(config, Arc::new(AppState::new(config, metrics)))
    }

    /// Use a prepared state, e.g. one with a custom connector
    pub fn with_state(config: &Config, state: Arc<AppState>) -> Self {
        Self {
            bind_addr: config.server.bind_addr,
            ws_path: config.server.ws_path.clone(),
            state,
        }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state), &self.ws_path)
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind server to {}", self.bind_addr))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        if self.state.identity.is_none() {
            warn!("No valid UUID configured, all connections will be refused");
        }
        info!("Listening on {} (WebSocket path {})", local_addr, self.ws_path);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        info!("Server on {} stopped", local_addr);
        Ok(())
    }
}
