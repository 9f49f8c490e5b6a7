//! Transport layer: TLS connection establishment and HTTP/1.1 exchange.

pub mod connector;
pub mod h1;

pub use connector::{MaybeHttpsStream, TlsConnector};
pub use h1::H1Connection;
