//! # wscore — RFC 6455 WebSocket endpoint library
//!
//! `wscore` implements both sides of the WebSocket protocol (version 13):
//! the HTTP-Upgrade handshake in client and server roles, and a streaming
//! frame engine that reassembles fragmented frames and fragmented messages
//! across arbitrary transport chunk boundaries, enforces the masking
//! asymmetry between roles, and rejects malformed frames with precise close
//! codes.
//!
//! ## Layers
//!
//! - [`protocol`] — stateless wire codec, mask engine, streaming parser,
//!   message reassembly, handshake parsing
//! - [`connection`] — binds a transport to the engine; callback-based host
//!   API with one-shot close sequencing
//! - [`client`] / [`server`] — role-specific handshake drivers
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use wscore::{client, ConnectOptions};
//!
//! let mut conn = client::connect("ws://localhost:9001/chat", ConnectOptions::default()).await?;
//! conn.on_text(|out, text| out.send_text(text));
//! conn.run().await;
//! ```
//!
//! The frame engine itself is synchronous and transport-agnostic; the
//! `async-tokio` feature (on by default) adds the tokio-driven connection
//! loop and handshake drivers, and `tls-rustls` adds `wss://` dialing.

pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod client;
#[cfg(feature = "async-tokio")]
pub mod server;

pub use close::{CloseCode, CloseFrame};
pub use config::{Config, Limits};
pub use connection::{Connection, Disconnect, Outbox, Role};
pub use error::{Error, Result};
pub use protocol::{compute_accept_key, Frame, FrameParser, MessageAssembler, OpCode, WS_GUID};

#[cfg(feature = "async-tokio")]
pub use client::{ConnectOptions, WsUrl};
#[cfg(feature = "async-tokio")]
pub use server::AcceptOptions;
