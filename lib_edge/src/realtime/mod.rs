//! # Realtime Module
//!
//! Everything between the edge server's WebSocket and the code that wants
//! its change notifications.
//!
//! ## Contained Modules:
//!
//! - **`transport`**: owns the single physical socket. Reconnects forever
//!   after any close, and runs the text `ping`/`pong` heartbeat that detects
//!   half-dead connections the TCP stack would keep open for minutes.
//! - **`multiplexer`**: the context object every view registers interest
//!   with. Reference counts `(event, filter)` pairs so the edge server only
//!   sees one `subscribe` per pair, replays them after every reconnect, and
//!   dispatches parsed envelopes to the listeners whose filter matches.
//! - **`envelope`**: the JSON change notification and its event names.
//! - **`command`**: the client-to-server text commands.
//! - **`filter`**: URI filter matching shared by client and dummy server.

/// Client-to-server text commands.
pub mod command;
/// Wire envelope and event-name parsing.
pub mod envelope;
/// URI filters with trailing-wildcard support.
pub mod filter;
/// The `(event, filter)` pub/sub dispatch layer.
pub mod multiplexer;
/// The reconnecting, heartbeating WebSocket.
pub mod transport;

pub use command::Command;
pub use envelope::{Action, Envelope, EventMeta, EventName, Payload};
pub use filter::UriFilter;
pub use multiplexer::{Multiplexer, MultiplexerConfig, ResubscribeMode, SubscriptionId};
pub use transport::{
    ReconnectPolicy, TransportConfig, TransportEvent, TransportHandle, TransportState,
};
