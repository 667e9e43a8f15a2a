//! # End-to-end test support
//!
//! Helpers shared by the integration tests under `tests/`: an in-process
//! edge server on an ephemeral port, transport settings fast enough for
//! tests to observe heartbeats and reconnects, and a polling wait.

#![forbid(unsafe_code)]

use std::time::Duration;

use lib_edge::dummy::DummyServer;
use lib_edge::realtime::{
    Multiplexer, MultiplexerConfig, ReconnectPolicy, ResubscribeMode, TransportConfig,
};
use lib_edge::retrieve::EdgeApi;

/// How long any expectation may take before a test gives up.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub async fn start_server() -> anyhow::Result<DummyServer> {
    Ok(DummyServer::start("127.0.0.1:0").await?)
}

/// Heartbeat every 100 ms, pong timeout 150 ms, reconnect after 50 ms.
pub fn fast_transport(url: &str) -> TransportConfig {
    TransportConfig {
        url: url.to_string(),
        heartbeat_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(150),
        connect_timeout: Duration::from_secs(1),
        reconnect: ReconnectPolicy::constant(Duration::from_millis(50)),
    }
}

pub fn multiplexer(server: &DummyServer, resubscribe: ResubscribeMode) -> Multiplexer {
    Multiplexer::connect(
        fast_transport(&server.ws_url()),
        MultiplexerConfig { resubscribe },
    )
}

pub fn edge_api(server: &DummyServer) -> anyhow::Result<EdgeApi> {
    Ok(EdgeApi::connect(&server.http_url(), None)?)
}

/// Polls `condition` every 10 ms until it holds or [`PATIENCE`] runs out.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
