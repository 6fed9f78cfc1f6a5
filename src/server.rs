//! Static file server for the generated feed tree.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::app::{Result, RssForwardError};

/// Routes: `/health` plus every file under `root`.
pub fn router(root: &Path) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback_service(ServeDir::new(root))
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Serves the data root on `0.0.0.0:<port>`; port 0 picks a free port.
///
/// Control methods block on the runtime and must be called from outside it.
pub struct FeedServer {
    root: PathBuf,
    port: u16,
    runtime: Handle,
    running: Option<Running>,
}

impl FeedServer {
    pub fn new(root: impl Into<PathBuf>, port: u16, runtime: Handle) -> Self {
        Self {
            root: root.into(),
            port,
            runtime,
            running: None,
        }
    }

    /// Start serving; returns the bound address. Already running is a no-op.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let listener = self
            .runtime
            .block_on(TcpListener::bind(("0.0.0.0", self.port)))
            .map_err(|e| RssForwardError::Server(format!("bind port {}: {}", self.port, e)))?;
        let addr = listener.local_addr()?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = router(&self.root);
        let task = self.runtime.spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                error!("Feed server failed: {}", e);
            }
        });

        info!(%addr, root = %self.root.display(), "Feed server started");
        self.running = Some(Running {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Shut down gracefully and wait for the server task.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = self.runtime.block_on(running.task) {
            error!("Feed server task ended abnormally: {}", e);
        }
        info!("Feed server stopped");
    }

    pub fn switch_state(&mut self, on: bool) -> Result<()> {
        if on {
            self.start().map(|_| ())
        } else {
            self.stop();
            Ok(())
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
        }
    }
}
