//! Server side of the opening handshake.
//!
//! [`accept`] validates a client upgrade request on an already-accepted
//! transport, writes the `101 Switching Protocols` response, and hands the
//! transport to a [`Connection`]. On error no response is written; the
//! caller closes the transport.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::Result;
use crate::protocol::handshake::{
    compute_accept_key, read_header_block, validate_origin, HandshakeRequest, HandshakeResponse,
};

/// Subprotocol selection callback: offered subprotocols in, chosen one out.
pub type ProtocolSelector = Box<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

/// Options for accepting a client upgrade.
pub struct AcceptOptions {
    /// Connection configuration applied after the upgrade. Its
    /// `allowed_origins` list, when set, gates the handshake.
    pub config: Config,
    /// Extra response headers.
    pub headers: Vec<(String, String)>,
    /// Chooses one of the offered subprotocols. The default chooses none.
    pub select_protocol: Option<ProtocolSelector>,
}

impl Default for AcceptOptions {
    fn default() -> Self {
        Self {
            config: Config::server(),
            headers: Vec::new(),
            select_protocol: None,
        }
    }
}

/// Accept a client upgrade on an established transport.
///
/// Bytes the client sent past the request terminator are preserved and
/// become the connection's first parser input.
///
/// # Errors
///
/// The handshake kinds of [`Error`](crate::Error): `InvalidMethod`,
/// `UnsupportedHttpVersion`, header violations, `InvalidWebSocketKey`,
/// `UnsupportedWebSocketVersion`, `OriginNotAllowed`,
/// `ClosedDuringHandshake`, or transport I/O.
pub async fn accept<T>(mut io: T, options: AcceptOptions) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (head, leftover) = read_header_block(&mut io, &options.config.limits).await?;

    let request = HandshakeRequest::parse(&head)?;
    request.validate()?;
    if let Some(allowed) = options.config.allowed_origins.as_deref() {
        validate_origin(request.origin.as_deref(), allowed)?;
    }

    let protocol = options
        .select_protocol
        .as_ref()
        .and_then(|select| select(&request.protocols));
    let response = HandshakeResponse {
        accept: compute_accept_key(&request.key),
        protocol,
    };
    let mut bytes = Vec::with_capacity(192);
    response.write(&mut bytes, &options.headers)?;
    io.write_all(&bytes).await?;
    io.flush().await?;

    let mut conn = Connection::new(io, Role::Server, options.config);
    conn.set_subprotocol(response.protocol);
    conn.set_preloaded(leftover);
    Ok(conn)
}
