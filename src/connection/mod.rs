//! Connection layer: binds a transport byte stream to the frame engine and
//! exposes the message-level host API.
//!
//! ## Lifecycle
//!
//! A `Connection` starts open (the handshake has already happened) and
//! terminates exactly once, through a single internal routine, regardless of
//! which path fired first: peer close frame, local [`end`](Connection::end),
//! transport end, I/O error, idle timeout, or protocol violation. The
//! end-of-connection callback fires at most once and nothing fires after it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wscore::{client, ConnectOptions};
//!
//! let mut conn = client::connect("ws://localhost:9001/chat", ConnectOptions::default()).await?;
//! conn.on_text(|out, text| out.send_text(text));
//! conn.send_text("hello").await?;
//! conn.run().await;
//! ```

mod role;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, Disconnect, Outbox};
pub use role::Role;
