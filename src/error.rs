//! Error types for the WebSocket endpoint library.
//!
//! Every failure the library can surface has its own variant, split between
//! the opening-handshake kinds (reported to the caller, who keeps ownership
//! of the transport) and the frame-engine kinds (converted to a close frame
//! and delivered through the end-of-connection callback exactly once).

use thiserror::Error;

use crate::close::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // ----- opening handshake -----
    /// The peer's response did not look like HTTP at all.
    #[error("peer did not speak HTTP")]
    NotHttp,

    /// The HTTP version was below 1.1.
    #[error("unsupported HTTP version: {0}")]
    UnsupportedHttpVersion(String),

    /// The server answered with a status other than 101.
    #[error("expected 101 Switching Protocols, got status {0}")]
    UpgradeRefused(u16),

    /// A header line was malformed, or a security-critical header was
    /// duplicated.
    #[error("malformed header block")]
    MalformedHeaders,

    /// The `Upgrade` header was missing or lacked the `websocket` token.
    #[error("invalid Upgrade header: {0:?}")]
    InvalidUpgradeHeader(String),

    /// The `Connection` header was missing or lacked the `upgrade` token.
    #[error("invalid Connection header: {0:?}")]
    InvalidConnectionHeader(String),

    /// `Sec-WebSocket-Accept` did not match the key we sent.
    #[error("Sec-WebSocket-Accept does not match the sent key")]
    AcceptMismatch,

    /// The request used a method other than GET.
    #[error("expected GET method, got {0}")]
    InvalidMethod(String),

    /// `Sec-WebSocket-Key` was missing, not base64, or not 16 bytes decoded.
    #[error("invalid Sec-WebSocket-Key: {0}")]
    InvalidWebSocketKey(String),

    /// `Sec-WebSocket-Version` was not 13.
    #[error("unsupported WebSocket version: {0} (expected 13)")]
    UnsupportedWebSocketVersion(String),

    /// The transport ended before the header block terminator arrived.
    #[error("socket closed during handshake")]
    ClosedDuringHandshake,

    /// Handshake data exceeded the configured maximum.
    #[error("handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A host-supplied header value contained CR or LF.
    #[error("header {0} contains CR or LF characters")]
    InvalidHeaderValue(String),

    /// The request's Origin did not match the configured allow-list.
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// A URL scheme other than `ws` or `wss` was supplied.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The endpoint URL could not be parsed.
    #[error("invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    // ----- frame engine -----
    /// The stream ended inside the two fixed header bytes.
    #[error("stream ended inside a frame header")]
    TruncatedHeader,

    /// The stream ended inside a 16-bit extended length field.
    #[error("stream ended inside a 16-bit length field")]
    TruncatedLength16,

    /// The stream ended inside a 64-bit extended length field.
    #[error("stream ended inside a 64-bit length field")]
    TruncatedLength64,

    /// The stream ended inside a masking key.
    #[error("stream ended inside a masking key")]
    TruncatedMaskKey,

    /// Reserved bits set without a negotiated extension.
    #[error("reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Reserved opcode used.
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// A server received an unmasked frame from a client.
    #[error("client frame must be masked")]
    UnmaskedClientFrame,

    /// A client received a masked frame from a server.
    #[error("server frame must not be masked")]
    MaskedServerFrame,

    /// An all-zero masking key arrived while policy rejects it.
    #[error("all-zero masking key rejected by policy")]
    ZeroMaskKey,

    /// A continuation frame arrived without a message in progress.
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    /// A new data opcode arrived while a fragmented message was in progress.
    #[error("data frame while a fragmented message is in progress")]
    InterleavedDataFrame,

    /// Control frame with FIN clear (RFC violation).
    #[error("control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload above 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Invalid UTF-8 in a text message.
    #[error("invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Reassembled message exceeds the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Single frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A one-shot decode ran out of bytes.
    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// The connection has already terminated.
    #[error("connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// No inbound byte arrived within the configured idle window.
    #[error("idle timeout expired")]
    IdleTimeout,

    /// I/O error from the transport.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// The RFC 6455 close code a frame-engine error maps to.
    ///
    /// Handshake errors never reach the wire as close frames, so they fall
    /// through to the protocol-error code like any other unexpected kind.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::ReservedBitsSet | Error::ReservedOpcode(_) => CloseCode::UnsupportedData,
            Error::UnmaskedClientFrame | Error::ZeroMaskKey | Error::IdleTimeout => {
                CloseCode::PolicyViolation
            }
            Error::MessageTooLarge { .. }
            | Error::FrameTooLarge { .. }
            | Error::TooManyFragments { .. } => CloseCode::MessageTooBig,
            Error::InvalidUtf8 => CloseCode::InvalidPayload,
            Error::Io(_) => CloseCode::InternalError,
            _ => CloseCode::ProtocolError,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
