use std::time::{Duration, Instant};

use lib_edge::realtime::{TransportEvent, transport};
use project_tests::{PATIENCE, eventually, fast_transport, start_server};
use tokio::sync::mpsc::UnboundedReceiver;

async fn next_event(events: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(PATIENCE, events.recv())
        .await
        .expect("timed out waiting for a transport event")
        .expect("transport event stream ended")
}

#[tokio::test]
async fn test_server_frames_reach_the_client() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (handle, mut events) = transport::spawn(fast_transport(&server.ws_url()));

    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    server.state().publish_raw(r#"{"hello":"world"}"#);

    loop {
        match next_event(&mut events).await {
            TransportEvent::Message(text) => {
                assert_eq!(text, r#"{"hello":"world"}"#);
                break;
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    handle.shutdown();
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_pong_is_not_surfaced_as_a_message() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (handle, mut events) = transport::spawn(fast_transport(&server.ws_url()));
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    // Several heartbeats go by; their pongs must stay inside the transport.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(events.try_recv().is_err(), "no event expected while idle");
    assert!(
        server.state().received_commands().iter().any(|c| c == "ping"),
        "the heartbeat should have pinged"
    );
    assert_eq!(server.state().connection_count(), 1, "healthy socket must not reconnect");

    handle.shutdown();
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sent_command_reaches_the_server() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (handle, _events) = transport::spawn(fast_transport(&server.ws_url()));
    handle.wait_open().await?;

    assert!(handle.send("subscribe features:created /locations/L1/features/*"));
    assert!(
        eventually(|| {
            server
                .state()
                .received_commands()
                .iter()
                .any(|c| c == "subscribe features:created /locations/L1/features/*")
        })
        .await,
        "server never saw the command"
    );

    handle.shutdown();
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_pong_forces_a_reconnect() -> anyhow::Result<()> {
    let server = start_server().await?;
    server.state().set_mute_pong(true);
    let (handle, mut events) = transport::spawn(fast_transport(&server.ws_url()));
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    let opened = Instant::now();

    // First ping at 100 ms, declared dead 150 ms later, retried after 50 ms.
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    let elapsed = opened.elapsed();
    assert!(
        elapsed >= Duration::from_millis(250),
        "closed before the pong timeout could expire: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(1),
        "reconnect should follow heartbeat + pong timeout + delay, took {elapsed:?}"
    );
    assert!(eventually(|| server.state().connection_count() >= 2).await);

    server.state().set_mute_pong(false);
    handle.shutdown();
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_dropped_socket_closes_then_reopens() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (handle, mut events) = transport::spawn(fast_transport(&server.ws_url()));
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    server.state().disconnect_all();
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    assert!(eventually(|| server.state().connection_count() == 2).await);

    handle.shutdown();
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_reconnecting() -> anyhow::Result<()> {
    let server = start_server().await?;
    let (handle, _events) = transport::spawn(fast_transport(&server.ws_url()));
    handle.wait_open().await?;

    handle.shutdown();
    assert!(handle.is_shutdown());
    assert!(eventually(|| server.state().client_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.state().connection_count(), 1);
    assert!(!handle.send("ping"), "send after shutdown must be refused");

    server.shutdown().await;
    Ok(())
}
