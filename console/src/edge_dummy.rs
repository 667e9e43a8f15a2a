use anyhow::Result;
use lib_edge::configs::ClientConfig;
use lib_edge::dummy::{DummyServer, DummyState};
use lib_edge::loggers::setup_logging;
use serde_json::json;

mod signals;

/// A location with a few records so a fresh watcher has something to show.
fn seed_demo(state: &DummyState) {
    state.seed("/locations", vec![json!({"id": "L1", "name": "Demo site"})]);
    state.seed(
        "/locations/L1/features",
        vec![
            json!({"id": "F1", "location_id": "L1", "name": "Main exit", "type": "exit"}),
            json!({"id": "F2", "location_id": "L1", "name": "AED", "type": "aed"}),
        ],
    );
    state.seed(
        "/headsets",
        vec![json!({"id": "H1", "name": "Responder 1", "location_id": "L1"})],
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = ClientConfig::load()?.resolve()?;
    let _guard = setup_logging(&settings.log_dir, &settings.log_level, "edge_dummy")?;

    let state = DummyState::new();
    seed_demo(&state);
    let server = DummyServer::start_with(("0.0.0.0", settings.port), state).await?;
    tracing::info!(http = %server.http_url(), ws = %server.ws_url(), "edge server ready");

    signals::shutdown_requested().await;
    server.shutdown().await;
    tracing::info!("Shutdown complete.");
    Ok(())
}
