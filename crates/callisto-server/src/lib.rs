//! Callisto notebook execution server.
//!
//! Accepts WebSocket clients, turns submitted cells into addressable
//! modules, and propagates change-driven re-execution through the external
//! module graph.
//!
//! # Architecture
//!
//! - **Engine**: registry, invalidation, and the per-cell execution protocol
//! - **Session**: connected clients and acknowledged broadcast
//! - **Protocol**: client/server frame types
//! - **Routes**: HTTP and WebSocket handlers
//! - **Watcher**: file system monitoring feeding invalidation

pub mod engine;
pub mod error;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod watcher;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use callisto_core::{ModuleRuntime, Rewriter};

pub use engine::ExecutionEngine;
pub use error::{ServerError, ServerResult};
pub use protocol::{ClientFrame, ServerFrame};
pub use routes::{AppState, create_router};
pub use session::{ClientSession, Outbound, SessionManager};
pub use watcher::{FileEvent, FileWatcher};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Externally reachable origin for client-executed cell modules.
    /// Defaults to `http://<host>:<port>`.
    pub origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            origin: None,
        }
    }
}

/// Start the execution server for a project root.
///
/// The dev-server collaborators (module runtime and cell rewriter) are
/// supplied by the embedder. Session tracking, the execution protocol,
/// and file-watch invalidation all run here.
pub async fn serve(
    runtime: Arc<dyn ModuleRuntime>,
    rewriter: Arc<dyn Rewriter>,
    project_root: impl AsRef<Path>,
    config: ServerConfig,
) -> ServerResult<()> {
    let root = project_root.as_ref();

    let origin = config
        .origin
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", config.host, config.port));

    let sessions = Arc::new(SessionManager::new());
    let engine = Arc::new(ExecutionEngine::new(
        runtime,
        rewriter,
        sessions,
        root,
        origin,
    ));

    let state = Arc::new(AppState {
        engine: engine.clone(),
    });
    let app = create_router(state);

    // Feed file-watch events into the invalidation engine.
    let mut watcher = FileWatcher::new(root)?;
    let watcher_task = tokio::spawn(async move {
        while let Some(event) = watcher.recv().await {
            match event {
                FileEvent::Changed(path) => {
                    tracing::debug!(path = %path.display(), "source changed");
                    engine.invalidate_module(&path.to_string_lossy());
                }
                FileEvent::Removed(path) => {
                    tracing::warn!(path = %path.display(), "source removed");
                    engine.invalidate_module(&path.to_string_lossy());
                }
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    tracing::info!("Starting Callisto server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });

    server.await?;

    watcher_task.abort();
    let _ = watcher_task.await;

    tracing::info!("Server shutdown complete");

    Ok(())
}
