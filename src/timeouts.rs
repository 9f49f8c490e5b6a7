//! Timeout configuration for HTTP requests.
//!
//! # Timeout Semantics
//!
//! - **connect**: Does NOT reset. Deadline for DNS + TCP + TLS handshake.
//! - **read**: RESETS on each received chunk. Detects hung responses.
//! - **write**: RESETS on each sent chunk. Detects hung uploads.
//!
//! All timeouts are optional. When `None`, no timeout is applied for that
//! phase and the transport default applies.

use std::time::Duration;

/// Timeout configuration for HTTP requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Timeout for establishing the connection (DNS + TCP + TLS handshake).
    pub connect: Option<Duration>,

    /// Read idle timeout: maximum time waiting for the next chunk of
    /// response data.
    pub read: Option<Duration>,

    /// Write idle timeout: maximum time waiting to send the next chunk of
    /// request data.
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Create a new Timeouts with all timeouts set to None.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a freshly constructed client: 10s connect, read and
    /// write left to the transport.
    pub fn client_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read: None,
            write: None,
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set read idle timeout.
    pub fn read(mut self, timeout: Duration) -> Self {
        self.read = Some(timeout);
        self
    }

    /// Set write idle timeout.
    pub fn write(mut self, timeout: Duration) -> Self {
        self.write = Some(timeout);
        self
    }

    /// Set read/write timeouts from optional millisecond values as supplied
    /// by the host (absent = transport default).
    pub fn with_millis(mut self, read_ms: Option<u64>, write_ms: Option<u64>) -> Self {
        if let Some(ms) = read_ms {
            self.read = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = write_ms {
            self.write = Some(Duration::from_millis(ms));
        }
        self
    }
}
