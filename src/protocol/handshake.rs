//! HTTP Upgrade handshake (RFC 6455 Section 4).
//!
//! Parsing and serialization of the upgrade request and response, plus the
//! `Sec-WebSocket-Accept` computation. The role-specific drivers that own a
//! transport live in [`client`](crate::client) and [`server`](crate::server).

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

#[cfg(feature = "async-tokio")]
use crate::config::Limits;
use crate::error::{Error, Result};

/// The GUID appended to the client key before hashing (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Headers that must not appear twice in a request.
const SECURITY_HEADERS: [&str; 5] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Compute `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`:
/// base64(SHA-1(key ‖ GUID)).
///
/// # Example
///
/// ```
/// use wscore::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Whether a comma-separated header value contains `token`, compared
/// case-insensitively with per-token trimming.
fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Parse `HTTP/M.m` into its version pair.
fn parse_http_version(text: &str) -> Option<(u8, u8)> {
    let rest = text.strip_prefix("HTTP/")?;
    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Reject header values that would allow response splitting.
fn check_header_value(name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue(name.to_string()));
    }
    Ok(())
}

/// Collect header lines into a case-insensitive map. Duplicated
/// security-critical headers and lines without a colon are rejected.
fn parse_headers<'a, I>(lines: I) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or(Error::MalformedHeaders)?;
        let name = name.trim().to_lowercase();
        if SECURITY_HEADERS.contains(&name.as_str()) && headers.contains_key(&name) {
            return Err(Error::MalformedHeaders);
        }
        headers.insert(name, value.trim().to_string());
    }
    Ok(headers)
}

/// Validate an Origin value against an allow-list. An empty list rejects
/// everything; origin filtering is opt-in at the [`Config`](crate::Config)
/// level.
pub fn validate_origin(origin: Option<&str>, allowed: &[String]) -> Result<()> {
    match origin {
        Some(o) if allowed.iter().any(|a| a == o) => Ok(()),
        Some(o) => Err(Error::OriginNotAllowed(o.to_string())),
        None => Err(Error::OriginNotAllowed("(none)".to_string())),
    }
}

/// A parsed client upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path and query.
    pub path: String,
    /// `Host` header value.
    pub host: String,
    /// `Sec-WebSocket-Key` header value, verbatim.
    pub key: String,
    /// `Sec-WebSocket-Version` header value, verbatim.
    pub version: String,
    /// `Origin` header value, if present.
    pub origin: Option<String>,
    /// Offered subprotocols in offer order.
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Parse an upgrade request from a raw HTTP header block.
    ///
    /// # Errors
    ///
    /// - `Error::NotHttp` — the request line is not HTTP-shaped
    /// - `Error::InvalidMethod` — method other than GET
    /// - `Error::UnsupportedHttpVersion` — version below 1.1
    /// - `Error::MalformedHeaders` — bad header line, duplicated security
    ///   header, or missing `Host`
    /// - `Error::InvalidUpgradeHeader` / `Error::InvalidConnectionHeader`
    /// - `Error::InvalidWebSocketKey` / `Error::UnsupportedWebSocketVersion`
    ///   — the headers are missing (values are checked by [`validate`](Self::validate))
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| Error::NotHttp)?;
        let mut lines = text.lines();

        let request_line = lines.next().ok_or(Error::NotHttp)?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next().ok_or(Error::NotHttp)?;
        let path = parts.next().ok_or(Error::NotHttp)?;
        let version = parts.next().ok_or(Error::NotHttp)?;
        if parts.next().is_some() {
            return Err(Error::NotHttp);
        }

        if method != "GET" {
            return Err(Error::InvalidMethod(method.to_string()));
        }
        let (major, minor) = parse_http_version(version).ok_or(Error::NotHttp)?;
        if (major, minor) < (1, 1) {
            return Err(Error::UnsupportedHttpVersion(version.to_string()));
        }

        let headers = parse_headers(lines)?;

        let upgrade = headers.get("upgrade").cloned().unwrap_or_default();
        if !has_token(&upgrade, "websocket") {
            return Err(Error::InvalidUpgradeHeader(upgrade));
        }
        let connection = headers.get("connection").cloned().unwrap_or_default();
        if !has_token(&connection, "upgrade") {
            return Err(Error::InvalidConnectionHeader(connection));
        }

        let host = headers
            .get("host")
            .cloned()
            .ok_or(Error::MalformedHeaders)?;
        let key = headers
            .get("sec-websocket-key")
            .cloned()
            .ok_or_else(|| Error::InvalidWebSocketKey("missing".to_string()))?;
        let version = headers
            .get("sec-websocket-version")
            .cloned()
            .ok_or_else(|| Error::UnsupportedWebSocketVersion("missing".to_string()))?;

        let origin = headers.get("origin").cloned();
        let protocols = headers
            .get("sec-websocket-protocol")
            .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            host,
            key,
            version,
            origin,
            protocols,
        })
    }

    /// Check the header values a server must enforce before upgrading.
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedWebSocketVersion` — version other than 13
    /// - `Error::InvalidWebSocketKey` — not 24 base64 chars decoding to
    ///   exactly 16 bytes
    pub fn validate(&self) -> Result<()> {
        if self.version != "13" {
            return Err(Error::UnsupportedWebSocketVersion(self.version.clone()));
        }
        if self.key.len() != 24 {
            return Err(Error::InvalidWebSocketKey(self.key.clone()));
        }
        match BASE64.decode(&self.key) {
            Ok(decoded) if decoded.len() == 16 => Ok(()),
            _ => Err(Error::InvalidWebSocketKey(self.key.clone())),
        }
    }
}

/// A parsed (client side) or to-be-written (server side) upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// `Sec-WebSocket-Accept` value.
    pub accept: String,
    /// Server-selected subprotocol, if any.
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Parse and validate a server response on the client side.
    ///
    /// # Errors
    ///
    /// - `Error::NotHttp` — status line not of the form
    ///   `HTTP/<M>.<m> <3-digit> <reason>`
    /// - `Error::UnsupportedHttpVersion` — version below 1.1
    /// - `Error::UpgradeRefused` — status other than 101
    /// - `Error::MalformedHeaders`, `Error::InvalidUpgradeHeader`,
    ///   `Error::InvalidConnectionHeader`
    /// - `Error::AcceptMismatch` — `Sec-WebSocket-Accept` missing (equality
    ///   against the sent key is the caller's check)
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| Error::NotHttp)?;
        let mut lines = text.lines();

        let status_line = lines.next().ok_or(Error::NotHttp)?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().ok_or(Error::NotHttp)?;
        let (major, minor) = parse_http_version(version).ok_or(Error::NotHttp)?;
        if (major, minor) < (1, 1) {
            return Err(Error::UnsupportedHttpVersion(version.to_string()));
        }
        let status_text = parts.next().ok_or(Error::NotHttp)?;
        if status_text.len() != 3 {
            return Err(Error::NotHttp);
        }
        let status: u16 = status_text.parse().map_err(|_| Error::NotHttp)?;
        if status != 101 {
            return Err(Error::UpgradeRefused(status));
        }

        let headers = parse_headers(lines)?;

        let upgrade = headers.get("upgrade").cloned().unwrap_or_default();
        if !has_token(&upgrade, "websocket") {
            return Err(Error::InvalidUpgradeHeader(upgrade));
        }
        let connection = headers.get("connection").cloned().unwrap_or_default();
        if !has_token(&connection, "upgrade") {
            return Err(Error::InvalidConnectionHeader(connection));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .cloned()
            .ok_or(Error::AcceptMismatch)?;
        let protocol = headers.get("sec-websocket-protocol").cloned();

        Ok(Self { accept, protocol })
    }

    /// Serialize the `101 Switching Protocols` response, appending any
    /// host-supplied extra headers.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHeaderValue` when the protocol or an extra header
    /// value contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>, extra_headers: &[(String, String)]) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        if let Some(ref protocol) = self.protocol {
            check_header_value("Sec-WebSocket-Protocol", protocol)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {}\r\n", protocol).as_bytes());
        }
        for (name, value) in extra_headers {
            check_header_value(name, value)?;
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Build the client's upgrade request. User header names are lowered; the
/// mandatory upgrade headers cannot be overridden.
///
/// # Errors
///
/// `Error::InvalidHeaderValue` when a user header contains CR or LF.
pub fn write_client_request(
    buf: &mut Vec<u8>,
    path: &str,
    host: &str,
    key: &str,
    headers: &[(String, String)],
    subprotocols: &[String],
) -> Result<()> {
    buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", path).as_bytes());
    buf.extend_from_slice(format!("host: {}\r\n", host).as_bytes());
    buf.extend_from_slice(b"upgrade: websocket\r\n");
    buf.extend_from_slice(b"connection: keep-alive, upgrade\r\n");
    buf.extend_from_slice(format!("sec-websocket-key: {}\r\n", key).as_bytes());
    buf.extend_from_slice(b"sec-websocket-version: 13\r\n");
    if !subprotocols.is_empty() {
        buf.extend_from_slice(
            format!("sec-websocket-protocol: {}\r\n", subprotocols.join(", ")).as_bytes(),
        );
    }
    for (name, value) in headers {
        check_header_value(name, value)?;
        buf.extend_from_slice(format!("{}: {}\r\n", name.to_lowercase(), value).as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    Ok(())
}

/// Read a transport until the CRLF CRLF header terminator. Returns the
/// header block (terminator included) and any bytes past it — after a
/// successful upgrade those become the first parser input.
///
/// The handshake bound covers everything buffered before the terminator is
/// seen, pipelined frame bytes included. The check runs before each chunk
/// is committed, so the buffer never grows past the limit.
#[cfg(feature = "async-tokio")]
pub(crate) async fn read_header_block<T>(io: &mut T, limits: &Limits) -> Result<(Vec<u8>, Vec<u8>)>
where
    T: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = io.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ClosedDuringHandshake);
        }
        limits.check_handshake_size(buf.len() + n)?;
        // The terminator can straddle the read boundary.
        let search_from = buf.len().saturating_sub(3);
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf[search_from..]
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
        {
            let leftover = buf.split_off(search_from + pos + 4);
            return Ok((buf, leftover));
        }
    }
}
