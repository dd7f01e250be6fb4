//! Client side of the opening handshake.
//!
//! [`connect`] dials a `ws://` URL over TCP and upgrades it;
//! [`connect_tls`] (feature `tls-rustls`) does the same for `wss://`;
//! [`handshake`] performs the upgrade over any transport the caller already
//! established.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::{
    compute_accept_key, read_header_block, write_client_request, HandshakeResponse,
};

/// A parsed `ws://` or `wss://` endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// `wss` scheme.
    pub secure: bool,
    /// Host name or address, without brackets.
    pub host: String,
    /// Port, defaulted from the scheme: 80 for `ws`, 443 for `wss`.
    pub port: u16,
    /// Path plus query, `/` when absent.
    pub path: String,
}

impl WsUrl {
    /// Parse an endpoint URL.
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedScheme` for schemes other than `ws`/`wss`,
    /// `Error::InvalidUrl` for anything else that does not parse.
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        let secure = match scheme {
            "ws" => false,
            "wss" => true,
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let default_port = if secure { 443 } else { 80 };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let end = bracketed
                .find(']')
                .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
            let host = &bracketed[..end];
            let port = match bracketed[end + 1..].strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| Error::InvalidUrl(url.to_string()))?,
                None if bracketed[end + 1..].is_empty() => default_port,
                None => return Err(Error::InvalidUrl(url.to_string())),
            };
            (host.to_string(), port)
        } else if let Some((host, port)) = authority.rsplit_once(':') {
            let port = port.parse().map_err(|_| Error::InvalidUrl(url.to_string()))?;
            (host.to_string(), port)
        } else {
            (authority.to_string(), default_port)
        };

        if host.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            secure,
            host,
            port,
            path: path.to_string(),
        })
    }

    /// The `Host` header value: port included only when non-default, IPv6
    /// addresses re-bracketed.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Options for the client handshake.
pub struct ConnectOptions {
    /// Extra request headers. Names are lowercased on the wire.
    pub headers: Vec<(String, String)>,
    /// Subprotocols to offer, in preference order.
    pub subprotocols: Vec<String>,
    /// Connection configuration applied after the upgrade.
    pub config: Config,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            subprotocols: Vec::new(),
            config: Config::client(),
        }
    }
}

/// Generate the 16-byte random `Sec-WebSocket-Key`, base64-encoded.
fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::getrandom(&mut bytes).is_err() {
        // Clock fallback when the OS source is unavailable.
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (seed >> (i * 8)) as u8;
        }
    }
    BASE64.encode(bytes)
}

/// Perform the client handshake over an established transport.
///
/// On success the transport moves into the returned [`Connection`]; any
/// bytes the server sent past the header terminator become the first parser
/// input. On failure the caller keeps responsibility for closing the
/// transport.
///
/// # Errors
///
/// The handshake kinds of [`Error`]: `UpgradeRefused`, `AcceptMismatch`,
/// `NotHttp`, header violations, `ClosedDuringHandshake`, or transport I/O.
pub async fn handshake<T>(mut io: T, url: &WsUrl, options: ConnectOptions) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let mut request = Vec::with_capacity(256);
    write_client_request(
        &mut request,
        &url.path,
        &url.host_header(),
        &key,
        &options.headers,
        &options.subprotocols,
    )?;
    io.write_all(&request).await?;
    io.flush().await?;

    let (head, leftover) = read_header_block(&mut io, &options.config.limits).await?;
    let response = HandshakeResponse::parse(&head)?;
    if response.accept != compute_accept_key(&key) {
        return Err(Error::AcceptMismatch);
    }

    let mut conn = Connection::new(io, Role::Client, options.config);
    conn.set_subprotocol(response.protocol);
    conn.set_preloaded(leftover);
    Ok(conn)
}

/// Dial a `ws://` URL over TCP and upgrade it.
///
/// # Errors
///
/// URL and handshake errors, or transport I/O. `wss://` URLs are refused
/// here; use [`connect_tls`].
pub async fn connect(url: &str, options: ConnectOptions) -> Result<Connection<TcpStream>> {
    let parsed = WsUrl::parse(url)?;
    if parsed.secure {
        return Err(Error::UnsupportedScheme("wss".to_string()));
    }
    let io = TcpStream::connect((parsed.host.as_str(), parsed.port)).await?;
    handshake(io, &parsed, options).await
}

/// Dial a `wss://` URL, wrap it in TLS with the webpki root set, and
/// upgrade it.
///
/// # Errors
///
/// URL, TLS and handshake errors, or transport I/O.
#[cfg(feature = "tls-rustls")]
pub async fn connect_tls(
    url: &str,
    options: ConnectOptions,
) -> Result<Connection<tokio_rustls::client::TlsStream<TcpStream>>> {
    use std::sync::Arc;

    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;

    let parsed = WsUrl::parse(url)?;
    if !parsed.secure {
        return Err(Error::UnsupportedScheme("ws".to_string()));
    }

    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(parsed.host.clone())
        .map_err(|_| Error::InvalidUrl(parsed.host.clone()))?;

    let tcp = TcpStream::connect((parsed.host.as_str(), parsed.port)).await?;
    let io = connector.connect(server_name, tcp).await?;
    handshake(io, &parsed, options).await
}
