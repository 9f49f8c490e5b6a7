//! # pinfetch
//!
//! Certificate-pinning HTTP client for host applications.
//!
//! The host configures connection parameters once per process — a pin set
//! of bundled certificates, or an explicit trust-all bypass, plus timeouts
//! — and then issues declarative fetches: headers, method, a raw or
//! multipart body, and an opaque tag for bulk cancellation. Cookies are
//! kept per host and replayed automatically.

pub mod client;
pub mod cookie;
pub mod error;
pub mod module;
pub mod request;
pub mod response;
pub mod timeouts;
pub mod transport;
pub mod trust;

// Re-exports
pub use client::{CallRegistry, CallState, HttpClient};
pub use cookie::{Cookie, CookieJar, CookieSink};
pub use error::{Error, ErrorKind, Result};
pub use module::{PinningModule, PinningOptions};
pub use request::{Body, BuiltRequest, FileResolver, Part, RequestOptions};
pub use response::Response;
pub use timeouts::Timeouts;
pub use trust::{BundleDir, CertificateSource, TrustConfig};
