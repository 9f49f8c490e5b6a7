//! BoringSSL TLS connector honoring the client's trust configuration.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use boring::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use boring::x509::store::X509StoreBuilder;
use http::Uri;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::trust::TrustConfig;

/// TLS connector for the client.
///
/// `trust == None` means platform default verification (the lazily
/// constructed unpinned fallback client). `Some(Pinned)` restricts the
/// verify store to the pinned anchors; `Some(TrustAll)` disables both
/// certificate and hostname verification.
#[derive(Clone)]
pub struct TlsConnector {
    trust: Option<Arc<TrustConfig>>,
}

impl TlsConnector {
    /// Connector with platform default verification.
    pub fn new() -> Self {
        Self { trust: None }
    }

    /// Connector bound to an explicit trust configuration.
    pub fn with_trust(trust: Arc<TrustConfig>) -> Self {
        Self { trust: Some(trust) }
    }

    fn configure_ssl(&self) -> Result<SslConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("failed to create SSL connector: {e}")))?;

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("failed to set min TLS version: {e}")))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("failed to set max TLS version: {e}")))?;

        match self.trust.as_deref() {
            Some(TrustConfig::Pinned { anchors }) => {
                // Replace the verify store wholesale: only the pinned
                // anchors are trusted, no system roots.
                let mut store = X509StoreBuilder::new()
                    .map_err(|e| Error::tls(format!("failed to create trust store: {e}")))?;
                for cert in anchors {
                    store
                        .add_cert(cert.clone())
                        .map_err(|e| Error::tls(format!("failed to populate trust store: {e}")))?;
                }
                builder.set_cert_store(store.build());
                builder.set_verify(SslVerifyMode::PEER);
            }
            Some(TrustConfig::TrustAll) => {
                builder.set_verify(SslVerifyMode::NONE);
            }
            None => {
                // Platform default verification against the system store.
                builder.set_verify(SslVerifyMode::PEER);
            }
        }

        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| Error::tls(format!("failed to set ALPN: {e}")))?;

        Ok(builder.build())
    }

    /// Connect to a URI, returning either a plain TCP or TLS stream.
    ///
    /// `connect_timeout` caps DNS + TCP + TLS handshake as one deadline.
    pub async fn connect(
        &self,
        uri: &Uri,
        connect_timeout: Option<Duration>,
    ) -> Result<MaybeHttpsStream> {
        match connect_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.connect_inner(uri))
                .await
                .map_err(|_| Error::ConnectTimeout(deadline))?,
            None => self.connect_inner(uri).await,
        }
    }

    async fn connect_inner(&self, uri: &Uri) -> Result<MaybeHttpsStream> {
        let host = uri
            .host()
            .ok_or_else(|| Error::connection("missing host"))?;
        let is_https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let addr = format!("{host}:{port}");

        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::connection(format!("failed to connect to {addr}: {e}")))?;

        if !is_https {
            return Ok(MaybeHttpsStream::Http(tcp_stream));
        }

        let ssl_connector = self.configure_ssl()?;
        let mut ssl_config = ssl_connector
            .configure()
            .map_err(|e| Error::tls(format!("failed to configure SSL: {e}")))?;

        // Trust-all also accepts every hostname.
        if matches!(self.trust.as_deref(), Some(TrustConfig::TrustAll)) {
            ssl_config.set_verify_hostname(false);
        }

        let ssl_stream = tokio_boring::connect(ssl_config, host, tcp_stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {e}")))?;

        Ok(MaybeHttpsStream::Https(ssl_stream))
    }
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    Http(TcpStream),
    Https(SslStream<TcpStream>),
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
