//! Configuration and resource limits for WebSocket connections.

use std::time::Duration;

use crate::error::Error;

/// Shared shape of every bound check: compare, and build the right error
/// variant on overflow.
fn bounded(value: usize, max: usize, over: fn(usize, usize) -> Error) -> Result<(), Error> {
    if value > max {
        Err(over(value, max))
    } else {
        Ok(())
    }
}

/// Resource limits enforced by the frame engine.
///
/// These bound the memory a hostile peer can pin with oversized frames,
/// runaway fragmentation, or an endless header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload of a single frame in bytes. Default: 8 MB.
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes. Default: 32 MB.
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message. Default: 64.
    pub max_fragment_count: usize,

    /// Maximum bytes buffered while waiting for the handshake header
    /// terminator. Default: 16 KB.
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 8 << 20,
            max_message_size: 32 << 20,
            max_fragment_count: 64,
            max_handshake_size: 16 << 10,
        }
    }
}

impl Limits {
    /// Set the maximum single-frame payload size.
    #[must_use]
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Set the maximum reassembled-message size.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Set the maximum per-message fragment count.
    #[must_use]
    pub fn with_max_fragment_count(mut self, max: usize) -> Self {
        self.max_fragment_count = max;
        self
    }

    /// Set the maximum buffered handshake size.
    #[must_use]
    pub fn with_max_handshake_size(mut self, max: usize) -> Self {
        self.max_handshake_size = max;
        self
    }

    /// Validate a reassembled-message size.
    ///
    /// # Errors
    ///
    /// [`Error::MessageTooLarge`] when `size` exceeds the configured maximum.
    pub fn check_message_size(&self, size: usize) -> Result<(), Error> {
        bounded(size, self.max_message_size, |size, max| {
            Error::MessageTooLarge { size, max }
        })
    }

    /// Validate a single-frame payload size.
    ///
    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] when `size` exceeds the configured maximum.
    pub fn check_frame_size(&self, size: usize) -> Result<(), Error> {
        bounded(size, self.max_frame_size, |size, max| Error::FrameTooLarge {
            size,
            max,
        })
    }

    /// Validate a per-message fragment count.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyFragments`] when `count` exceeds the configured
    /// maximum.
    pub fn check_fragment_count(&self, count: usize) -> Result<(), Error> {
        bounded(count, self.max_fragment_count, |count, max| {
            Error::TooManyFragments { count, max }
        })
    }

    /// Validate accumulated handshake size.
    ///
    /// # Errors
    ///
    /// [`Error::HandshakeTooLarge`] when `size` exceeds the configured
    /// maximum.
    pub fn check_handshake_size(&self, size: usize) -> Result<(), Error> {
        bounded(size, self.max_handshake_size, |size, max| {
            Error::HandshakeTooLarge { size, max }
        })
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Accept inbound frames masked with an all-zero key.
    ///
    /// RFC 6455 permits a zero key (the XOR is the identity), and this
    /// library's own pre-built masked control frames use one, so the default
    /// is `true`. Set to `false` to treat a zero key as a policy violation.
    pub allow_zero_mask_key: bool,

    /// Close the connection with 1008 when no inbound byte arrives within
    /// this window. `None` disables the internal timer; hosts can still poll
    /// [`Connection::last_sync_date`](crate::Connection::last_sync_date).
    pub idle_timeout: Option<Duration>,

    /// Transport read chunk size in bytes. Default: 8 KB.
    pub read_buffer_size: usize,

    /// Initial outbound queue capacity in bytes. Default: 8 KB.
    pub write_buffer_size: usize,

    /// Origins accepted during the server handshake. `None` disables origin
    /// filtering; an empty list rejects every browser connection.
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            allow_zero_mask_key: true,
            idle_timeout: None,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            allowed_origins: None,
        }
    }
}

impl Config {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for the client role.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }

    /// Configuration for the server role.
    #[must_use]
    pub fn server() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the zero-mask-key policy.
    #[must_use]
    pub fn with_allow_zero_mask_key(mut self, allow: bool) -> Self {
        self.allow_zero_mask_key = allow;
        self
    }

    /// Set the transport read chunk size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the initial outbound queue capacity.
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Restrict the server handshake to the given origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 8 << 20);
        assert_eq!(limits.max_message_size, 32 << 20);
        assert_eq!(limits.max_fragment_count, 64);
        assert_eq!(limits.max_handshake_size, 16 << 10);
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::default()
            .with_max_frame_size(1024)
            .with_max_message_size(4096)
            .with_max_fragment_count(4)
            .with_max_handshake_size(512);
        assert!(limits.check_frame_size(1024).is_ok());
        assert!(limits.check_frame_size(1025).is_err());
        assert!(limits.check_message_size(4096).is_ok());
        assert!(limits.check_message_size(4097).is_err());
        assert!(limits.check_fragment_count(4).is_ok());
        assert!(limits.check_fragment_count(5).is_err());
        assert!(limits.check_handshake_size(512).is_ok());
        assert!(limits.check_handshake_size(513).is_err());
    }

    #[test]
    fn test_limit_errors_carry_both_sides() {
        let limits = Limits::default().with_max_message_size(8);
        assert_eq!(
            limits.check_message_size(9),
            Err(Error::MessageTooLarge { size: 9, max: 8 })
        );
        let limits = Limits::default().with_max_handshake_size(64);
        assert_eq!(
            limits.check_handshake_size(256),
            Err(Error::HandshakeTooLarge { size: 256, max: 64 })
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.allow_zero_mask_key);
        assert!(config.idle_timeout.is_none());
        assert!(config.allowed_origins.is_none());
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.write_buffer_size, 8192);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_limits(Limits::default().with_max_frame_size(1))
            .with_idle_timeout(Duration::from_secs(30))
            .with_allow_zero_mask_key(false)
            .with_read_buffer_size(1024)
            .with_write_buffer_size(2048)
            .with_allowed_origins(vec!["https://example.com".to_string()]);

        assert_eq!(config.limits.max_frame_size, 1);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert!(!config.allow_zero_mask_key);
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 2048);
        assert_eq!(
            config.allowed_origins,
            Some(vec!["https://example.com".to_string()])
        );
    }
}
