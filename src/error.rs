//! Error types for the pinfetch crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring trust or executing requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Trust configuration failure: a pinned certificate resource could not
    /// be resolved or parsed, or the trust store could not be built.
    #[error("TLS configuration error for '{identifier}': {reason}")]
    TlsConfig { identifier: String, reason: String },

    /// Request building failure (malformed multipart part, unresolvable
    /// file source, invalid method or URL).
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// Cookie parsing error.
    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    /// Malformed domain string passed to cookie lookup.
    #[error("Domain parse error: {0}")]
    DomainParse(String),

    /// HTTP protocol error on the wire.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Connection error (DNS, TCP).
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error, including pin rejection during the handshake.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connect timeout (TCP + TLS handshake).
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Read idle timeout (no response data received within duration).
    #[error("Read timeout after {0:?}")]
    ReadTimeout(Duration),

    /// Write idle timeout (could not send request data within duration).
    #[error("Write timeout after {0:?}")]
    WriteTimeout(Duration),

    /// The call was cancelled via its tag before completion.
    #[error("Call cancelled")]
    Cancelled,

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Host-facing error taxonomy. Transport failures of every flavor collapse
/// into `Network`: the transport cannot distinguish a pin rejection from a
/// bad network, so neither does the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TlsConfig,
    RequestBuild,
    Network,
    DomainParse,
    Cancelled,
}

impl Error {
    /// Create a TLS configuration error naming the failing identifier.
    pub fn tls_config(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TlsConfig {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a request build error.
    pub fn request_build(message: impl Into<String>) -> Self {
        Self::RequestBuild(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Map this error into the host-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TlsConfig { .. } => ErrorKind::TlsConfig,
            Self::RequestBuild(_) => ErrorKind::RequestBuild,
            Self::DomainParse(_) => ErrorKind::DomainParse,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Network,
        }
    }
}
