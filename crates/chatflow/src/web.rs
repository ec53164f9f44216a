// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health endpoint served while the runtime is up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chatflow_core::ChatflowError;
use chatflow_im::ImManager;
use chatflow_llm::LlmManager;
use chatflow_plugin::PluginLoader;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Handles shared by the routes.
#[derive(Clone)]
pub struct WebState {
    pub started_at: Instant,
    pub im_manager: Arc<ImManager>,
    pub llm_manager: Arc<LlmManager>,
    pub plugins: Arc<PluginLoader>,
}

/// `GET /healthz` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub im_adapters: Vec<String>,
    pub llm_models: Vec<String>,
    pub plugins: usize,
}

async fn get_health(State(state): State<WebState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        im_adapters: state.im_manager.running_adapters(),
        llm_models: state.llm_manager.active_models(),
        plugins: state.plugins.get_all_plugin_infos().len(),
    })
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/healthz", get(get_health))
        .with_state(state)
}

/// A running web server.
pub struct WebServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WebServer {
    /// Bind `host:port` and serve until [`stop`](Self::stop).
    pub async fn start(host: &str, port: u16, state: WebState) -> Result<Self, ChatflowError> {
        let bind = format!("{host}:{port}");
        let listener = TcpListener::bind(&bind).await.map_err(|e| ChatflowError::Adapter {
            message: format!("failed to bind web server to {bind}: {e}"),
            source: Some(Box::new(e)),
        })?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        let app = router(state);
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "web server error");
            }
        });
        info!(%addr, "web server listening");
        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "web server task failed");
        }
        info!("web server stopped");
    }
}

impl std::fmt::Debug for WebServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebServer").field("addr", &self.addr).finish_non_exhaustive()
    }
}
