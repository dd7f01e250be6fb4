use std::time::SystemTime;

use bytes::BytesMut;

use crate::close::CloseCode;
use crate::config::Config;
use crate::connection::Role;
use crate::error::Error;
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::frame::{
    Frame, OpCode, PING_FRAME, PING_FRAME_MASKED, PONG_FRAME, PONG_FRAME_MASKED,
};
use crate::protocol::parser::FrameParser;

#[cfg(feature = "async-tokio")]
use crate::error::Result;
#[cfg(feature = "async-tokio")]
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Why a connection ended. Delivered to the end-of-connection callback
/// alongside the close code that went on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer sent a close frame or ended the transport.
    ClosedByPeer,
    /// The local host called [`Connection::end`] or [`Outbox::close`].
    ClosedBySelf,
    /// A framing violation from the peer.
    ProtocolError,
    /// The transport failed.
    NetworkError,
    /// The idle timeout expired.
    TimedOut,
}

/// Masking-key generator: seeded once from the OS, advanced with a cheap
/// integer mix per key. Falls back to the system clock when the OS source
/// is unavailable.
#[derive(Debug)]
struct KeySource {
    state: u32,
}

impl KeySource {
    fn new() -> Self {
        let mut seed = [0u8; 4];
        let state = if getrandom::getrandom(&mut seed).is_ok() {
            u32::from_le_bytes(seed)
        } else {
            use std::time::UNIX_EPOCH;
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u32)
                .unwrap_or(0x6d73_6b67)
        };
        Self { state }
    }

    const fn from_seed(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next_key(&mut self) -> [u8; 4] {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        let mut k = self.state;
        k = (k ^ (k >> 16)).wrapping_mul(0x85EB_CA6B);
        k = (k ^ (k >> 13)).wrapping_mul(0xC2B2_AE35);
        (k ^ (k >> 16)).to_le_bytes()
    }
}

/// Queued outbound frames.
///
/// Message handlers receive `&mut Outbox`, so replies issued from inside a
/// callback are legal; queued bytes reach the transport before the next
/// inbound event is processed.
pub struct Outbox {
    buf: BytesMut,
    masking: bool,
    keys: KeySource,
    close_requested: bool,
}

impl Outbox {
    fn new(masking: bool, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            masking,
            keys: KeySource::new(),
            close_requested: false,
        }
    }

    fn queue(&mut self, frame: &Frame) {
        let mask = if self.masking {
            Some(self.keys.next_key())
        } else {
            None
        };
        frame.write_into(&mut self.buf, mask);
    }

    /// Queue a single unfragmented text frame.
    pub fn send_text(&mut self, text: &str) {
        self.queue(&Frame::text(text.as_bytes().to_vec()));
    }

    /// Queue a single unfragmented binary frame.
    pub fn send_binary(&mut self, data: &[u8]) {
        self.queue(&Frame::binary(data.to_vec()));
    }

    /// Queue the role-appropriate pre-built ping frame.
    pub fn send_ping(&mut self) {
        if self.masking {
            self.buf.extend_from_slice(&PING_FRAME_MASKED);
        } else {
            self.buf.extend_from_slice(&PING_FRAME);
        }
    }

    /// Pongs echo the ping payload. Empty pongs use the pre-built frames.
    fn send_pong(&mut self, payload: Vec<u8>) {
        if payload.is_empty() {
            if self.masking {
                self.buf.extend_from_slice(&PONG_FRAME_MASKED);
            } else {
                self.buf.extend_from_slice(&PONG_FRAME);
            }
        } else {
            self.queue(&Frame::pong(payload));
        }
    }

    /// Request an orderly local close once the current callback returns.
    pub fn close(&mut self) {
        self.close_requested = true;
    }

    /// Number of bytes currently queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

type TextHandler = Box<dyn FnMut(&mut Outbox, &str) + Send>;
type BinaryHandler = Box<dyn FnMut(&mut Outbox, &[u8]) + Send>;
type SyncHandler = Box<dyn FnMut(SystemTime) + Send>;
type EndHandler = Box<dyn FnOnce(Disconnect, CloseCode, Option<Error>) + Send>;

/// A handshaken WebSocket connection over a byte-stream transport.
///
/// The connection owns the transport, the streaming parser, and the
/// reassembly state for its whole lifetime. Inbound traffic is processed by
/// [`feed`](Connection::feed) (synchronous, callback-dispatching) which the
/// async [`run`](Connection::run) driver calls per transport chunk; outbound
/// traffic goes through the send methods or the [`Outbox`] handed to message
/// callbacks.
pub struct Connection<T> {
    io: T,
    role: Role,
    config: Config,
    parser: FrameParser,
    assembler: MessageAssembler,
    outbox: Outbox,
    alive: bool,
    last_sync: SystemTime,
    clock: fn() -> SystemTime,
    subprotocol: Option<String>,
    preloaded: Option<Vec<u8>>,
    on_text: Option<TextHandler>,
    on_binary: Option<BinaryHandler>,
    on_sync: Option<SyncHandler>,
    on_end: Option<EndHandler>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("io", &self.io)
            .field("role", &self.role)
            .field("config", &self.config)
            .field("alive", &self.alive)
            .field("last_sync", &self.last_sync)
            .field("subprotocol", &self.subprotocol)
            .field("preloaded", &self.preloaded)
            .finish_non_exhaustive()
    }
}

impl<T> Connection<T> {
    /// Wrap an already-upgraded transport. The handshake drivers in
    /// [`client`](crate::client) and [`server`](crate::server) call this for
    /// you.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let clock: fn() -> SystemTime = SystemTime::now;
        Self {
            parser: FrameParser::new(role, &config),
            assembler: MessageAssembler::new(config.limits.clone()),
            outbox: Outbox::new(role.masks_output(), config.write_buffer_size),
            io,
            role,
            config,
            alive: true,
            last_sync: clock(),
            clock,
            subprotocol: None,
            preloaded: None,
            on_text: None,
            on_binary: None,
            on_sync: None,
            on_end: None,
        }
    }

    /// Replace the timestamp source. Useful for deterministic tests.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> SystemTime) -> Self {
        self.clock = clock;
        self.last_sync = clock();
        self
    }

    /// Seed the masking-key generator. Useful for reproducible wire traces.
    #[must_use]
    pub fn with_mask_seed(mut self, seed: u32) -> Self {
        self.outbox.keys = KeySource::from_seed(seed);
        self
    }

    pub(crate) fn set_subprotocol(&mut self, protocol: Option<String>) {
        self.subprotocol = protocol;
    }

    pub(crate) fn set_preloaded(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.preloaded = Some(bytes);
        }
    }

    /// The endpoint role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The subprotocol the server selected during the handshake, if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Whether the connection is still live. Transitions to `false` exactly
    /// once and never back.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.alive
    }

    /// Timestamp of the most recent inbound chunk.
    #[must_use]
    pub fn last_sync_date(&self) -> SystemTime {
        self.last_sync
    }

    /// Install the text-message handler, replacing any previous one.
    pub fn on_text(&mut self, cb: impl FnMut(&mut Outbox, &str) + Send + 'static) {
        self.on_text = Some(Box::new(cb));
    }

    /// Install the binary-message handler, replacing any previous one.
    pub fn on_binary(&mut self, cb: impl FnMut(&mut Outbox, &[u8]) + Send + 'static) {
        self.on_binary = Some(Box::new(cb));
    }

    /// Install the activity handler. It fires with the arrival timestamp of
    /// every inbound chunk, before any message callback for that chunk.
    pub fn on_sync(&mut self, cb: impl FnMut(SystemTime) + Send + 'static) {
        self.on_sync = Some(Box::new(cb));
    }

    /// Install the end-of-connection handler. It fires at most once; no
    /// other callback fires after it.
    pub fn on_end(&mut self, cb: impl FnOnce(Disconnect, CloseCode, Option<Error>) + Send + 'static) {
        self.on_end = Some(Box::new(cb));
    }

    /// Process one inbound transport chunk.
    ///
    /// Synchronous and non-suspending: callbacks run on this call stack, and
    /// outbound replies (pongs, callback sends, a close frame) are queued in
    /// the outbox for the async driver to flush. Once the connection has
    /// terminated this is a no-op.
    pub fn feed(&mut self, chunk: &[u8]) {
        if !self.alive {
            return;
        }

        let now = (self.clock)();
        self.last_sync = now;
        if let Some(cb) = self.on_sync.as_mut() {
            cb(now);
        }

        let mut frames = Vec::new();
        let parsed = self.parser.feed(chunk, &mut frames);
        // Frames completed ahead of a mid-chunk error still get delivered.
        self.dispatch(frames);
        if let Err(err) = parsed {
            let code = err.close_code();
            self.terminate(Disconnect::ProtocolError, code, Some(err));
        }

        if self.alive && self.outbox.close_requested {
            self.terminate(Disconnect::ClosedBySelf, CloseCode::Normal, None);
        }
    }

    fn dispatch(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if !self.alive {
                break;
            }
            match frame.opcode {
                OpCode::Ping => self.outbox.send_pong(frame.into_payload()),
                OpCode::Pong => {}
                OpCode::Close => {
                    self.terminate(Disconnect::ClosedByPeer, CloseCode::Normal, None);
                }
                _ => match self.assembler.push(frame) {
                    Ok(Some(message)) => {
                        if message.opcode == OpCode::Text {
                            match message.into_text() {
                                Ok(text) => {
                                    if let Some(cb) = self.on_text.as_mut() {
                                        cb(&mut self.outbox, &text);
                                    }
                                }
                                Err(err) => {
                                    let code = err.close_code();
                                    self.terminate(Disconnect::ProtocolError, code, Some(err));
                                }
                            }
                        } else if let Some(cb) = self.on_binary.as_mut() {
                            cb(&mut self.outbox, &message.payload);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let code = err.close_code();
                        self.terminate(Disconnect::ProtocolError, code, Some(err));
                    }
                },
            }
        }
    }

    /// The only path that terminates the connection. Idempotent: flips the
    /// liveness flag once, queues a close frame, and fires the end handler.
    fn terminate(&mut self, why: Disconnect, code: CloseCode, error: Option<Error>) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.outbox.queue(&Frame::close(Some(code.as_u16()), ""));
        if let Some(cb) = self.on_end.take() {
            cb(why, code, error);
        }
    }
}

#[cfg(feature = "async-tokio")]
impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send a single unfragmented text frame.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` after termination, `Error::MessageTooLarge`
    /// over the configured limit, or a transport error.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        if !self.alive {
            return Err(Error::ConnectionClosed(None));
        }
        self.config.limits.check_message_size(text.len())?;
        self.outbox.send_text(text);
        self.flush().await
    }

    /// Send a single unfragmented binary frame.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send_text`](Connection::send_text).
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        if !self.alive {
            return Err(Error::ConnectionClosed(None));
        }
        self.config.limits.check_message_size(data.len())?;
        self.outbox.send_binary(data);
        self.flush().await
    }

    /// Send the pre-built ping frame for this role.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` after termination, or a transport error.
    pub async fn send_ping(&mut self) -> Result<()> {
        if !self.alive {
            return Err(Error::ConnectionClosed(None));
        }
        self.outbox.send_ping();
        self.flush().await
    }

    /// Initiate a local close: code 1000 on the wire, then flush and
    /// half-close the transport. Idempotent.
    ///
    /// # Errors
    ///
    /// Transport errors while flushing the close frame.
    pub async fn end(&mut self) -> Result<()> {
        self.terminate(Disconnect::ClosedBySelf, CloseCode::Normal, None);
        self.flush().await?;
        self.io.shutdown().await?;
        Ok(())
    }

    /// Write all queued outbound frames to the transport.
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub async fn flush(&mut self) -> Result<()> {
        if self.outbox.buf.is_empty() {
            return Ok(());
        }
        let buf = self.outbox.buf.split();
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Drive the connection until it terminates: flush queued output, read
    /// the next transport chunk (bounded by the idle timeout when one is
    /// configured), feed it to the engine, repeat. On exit the close frame
    /// is flushed and the transport half-closed.
    ///
    /// Every failure path is reported through the end-of-connection
    /// callback rather than a return value.
    pub async fn run(&mut self) {
        if let Some(bytes) = self.preloaded.take() {
            self.feed(&bytes);
        }
        let mut chunk = vec![0u8; self.config.read_buffer_size.max(64)];
        while self.alive {
            if let Err(err) = self.flush().await {
                self.terminate(Disconnect::NetworkError, CloseCode::InternalError, Some(err));
                break;
            }
            let read = match self.config.idle_timeout {
                Some(window) => match tokio::time::timeout(window, self.io.read(&mut chunk)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        self.terminate(
                            Disconnect::TimedOut,
                            CloseCode::PolicyViolation,
                            Some(Error::IdleTimeout),
                        );
                        break;
                    }
                },
                None => self.io.read(&mut chunk).await,
            };
            match read {
                Ok(0) => {
                    // Transport end. A partial frame left in the parser is a
                    // protocol error; a clean boundary is a normal end.
                    match self.parser.finish() {
                        Ok(()) => self.terminate(Disconnect::ClosedByPeer, CloseCode::Normal, None),
                        Err(err) => {
                            let code = err.close_code();
                            self.terminate(Disconnect::ProtocolError, code, Some(err));
                        }
                    }
                    break;
                }
                Ok(n) => self.feed(&chunk[..n]),
                Err(err) => {
                    self.terminate(
                        Disconnect::NetworkError,
                        CloseCode::InternalError,
                        Some(Error::Io(err.to_string())),
                    );
                    break;
                }
            }
        }
        let _ = self.flush().await;
        let _ = self.io.shutdown().await;
    }
}
