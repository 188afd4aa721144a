//! Transport configuration and endpoint naming.

use crate::defaults::{
    DEFAULT_ARENA_SIZE, DEFAULT_RETRY_INTERVAL, FALLBACK_SOCKET_DIR, SOCKET_NAME_PREFIX,
    SOCKET_NAME_SUFFIX,
};
use crate::error::{Error, Result};
use crate::memory::shm_name;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by providers and clients of a stream.
///
/// Both ends must agree on `socket_dir`.
///
/// # Example
///
/// ```rust
/// use framelink::transport::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::default()
///     .with_socket_dir("/run/framelink")
///     .with_arena_size(128 * 1024 * 1024)
///     .with_retry_interval(Duration::from_millis(250));
///
/// let path = config.socket_path("camera0").unwrap();
/// assert_eq!(path.to_str(), Some("/run/framelink/framelink-camera0.sock"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Directory holding the control sockets.
    pub socket_dir: PathBuf,
    /// Provider arena size in bytes.
    pub arena_size: usize,
    /// Client wait between reconnect attempts.
    pub retry_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let socket_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_SOCKET_DIR));
        Self {
            socket_dir,
            arena_size: DEFAULT_ARENA_SIZE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl TransportConfig {
    /// Set the socket directory.
    pub fn with_socket_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.socket_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the provider arena size.
    pub fn with_arena_size(mut self, bytes: usize) -> Self {
        self.arena_size = bytes;
        self
    }

    /// Set the client reconnect interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Control socket path of `stream`.
    pub fn socket_path(&self, stream: &str) -> Result<PathBuf> {
        // Same naming rules as the arena object.
        shm_name(stream)?;
        Ok(self
            .socket_dir
            .join(format!("{}{}{}", SOCKET_NAME_PREFIX, stream, SOCKET_NAME_SUFFIX)))
    }

    /// Check the settings before starting a provider.
    pub fn validate(&self) -> Result<()> {
        if self.arena_size == 0 {
            return Err(Error::Config("arena_size must be > 0".into()));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::Config("retry_interval must be > 0".into()));
        }
        Ok(())
    }
}
