use std::sync::Arc;

use anyhow::{Context, Result};
use lib_edge::configs::ClientConfig;
use lib_edge::loggers::setup_logging;
use lib_edge::realtime::Multiplexer;
use lib_edge::retrieve::EdgeApi;

mod signals;
mod watch_logic;
use watch_logic::{input, session::Session, view};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let settings = ClientConfig::load()?.resolve()?;
    let _guard = setup_logging(&settings.log_dir, &settings.log_level, "edge_watch")?;
    let location = settings
        .location
        .clone()
        .context("no location to watch; pass --location or set EDGE_LOCATION")?;

    let api = EdgeApi::connect(settings.api_url.as_str(), settings.auth_token.clone())?;
    let mux = Multiplexer::connect(settings.transport.clone(), settings.multiplexer.clone());
    let session = Arc::new(Session::new(mux.clone(), api));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let view_handle = tokio::spawn(view::run(Arc::clone(&session), shutdown_tx.subscribe()));
    let input_handle = tokio::spawn(input::run(Arc::clone(&session), shutdown_tx.subscribe()));

    tracing::info!(url = %settings.transport.url, %location, "watching");
    tokio::select! {
        _ = session.switch(&location) => {
            signals::shutdown_requested().await;
        }
        _ = signals::shutdown_requested() => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(view_handle, input_handle);

    session.close();
    mux.shutdown();
    tracing::info!("Shutdown complete.");
    Ok(())
}
