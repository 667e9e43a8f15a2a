//! # Dummy Edge Server
//!
//! A small in-process stand-in for the edge server, for local runs and
//! tests. It serves the REST collections from memory, answers the
//! WebSocket's `subscribe`/`unsubscribe`/`ping` commands with the same uri
//! filter matching as the real server, and announces every mutation as an
//! envelope. [`DummyState`] also exposes hooks tests use to misbehave on
//! purpose: raw frames, dropped sockets, and silence instead of `pong`.

/// Axum routes for REST and `/ws`.
pub mod routes;
/// Collections, subscriptions and test hooks.
pub mod state;

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;

pub use state::{ClientFrame, DummyState};

/// A running dummy server. Dropping it stops the server.
pub struct DummyServer {
    addr: SocketAddr,
    state: DummyState,
    task: JoinHandle<()>,
}

impl DummyServer {
    /// Binds `addr` (use port 0 for an ephemeral port) and starts serving.
    pub async fn start(addr: impl ToSocketAddrs) -> io::Result<DummyServer> {
        Self::start_with(addr, DummyState::new()).await
    }

    pub async fn start_with(addr: impl ToSocketAddrs, state: DummyState) -> io::Result<DummyServer> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = state.shutdown_token();
        let app = routes::router(state.clone());

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "dummy edge server failed");
            }
        });
        tracing::info!(%addr, "dummy edge server listening");

        Ok(DummyServer { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn state(&self) -> &DummyState {
        &self.state
    }

    /// Closes every socket, stops accepting and waits for the server task.
    pub async fn shutdown(mut self) {
        self.state.shutdown_token().cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "dummy edge server task ended abnormally");
        }
        tracing::info!(addr = %self.addr, "dummy edge server stopped");
    }
}

impl Drop for DummyServer {
    fn drop(&mut self) {
        self.state.shutdown_token().cancel();
    }
}
