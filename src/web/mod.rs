//! HTTP surface.
//!
//! GET routes answer with JSON; form submissions are urlencoded and answered with
//! a 303 redirect on success. Errors carry `{code, message, fields?}` with the
//! status of their error code.

pub mod handlers;
pub mod identity;
pub mod response;

use crate::service::{Positions, Projects, TaskManager, TaskTypes, Tags, Tasks, Teams, Workers};
use axum::Router;
use handlers::{resource_routes, session_routes};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router with all routes.
pub fn build_router(tm: TaskManager) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = session_routes(Router::new());
    router = resource_routes::<Positions>(router);
    router = resource_routes::<TaskTypes>(router);
    router = resource_routes::<Tags>(router);
    router = resource_routes::<Projects>(router);
    router = resource_routes::<Teams>(router);
    router = resource_routes::<Workers>(router);
    router = resource_routes::<Tasks>(router);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(tm)
}

/// A running server.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
}

/// Bind `addr` and serve in the background.
pub async fn start_server(tm: TaskManager, addr: &str) -> anyhow::Result<ServerHandle> {
    let app = build_router(tm);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Task manager listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx,
        task,
    })
}
