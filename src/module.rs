//! Host-facing module: configure pinning once, then fetch.
//!
//! The client instance is process-scoped state with a documented lifecycle:
//! created by the first successful configuration (or lazily, unpinned, by
//! the first fetch), read thereafter, never torn down. Reconfiguring
//! requires a new module instance; no teardown API exists here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;

use crate::client::HttpClient;
use crate::cookie::{CookieJar, CookieSink, NullSink};
use crate::error::Result;
use crate::request::{BuiltRequest, FileResolver, FsResolver, RequestOptions};
use crate::response::Response;
use crate::timeouts::Timeouts;
use crate::transport::TlsConnector;
use crate::trust::{CertificateSource, TrustConfig};

/// Connection parameters supplied once per hostname by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PinningOptions {
    /// `true` accepts every server certificate and hostname. An explicit
    /// bypass, never a default.
    pub trust: Option<bool>,
    /// Certificate identifiers, resolved as bundled `<identifier>.cer`
    /// resources. An empty list disables pinning.
    pub certs: Option<Vec<String>>,
    /// Read idle timeout in milliseconds; absent = transport default.
    pub read_timeout: Option<u64>,
    /// Write idle timeout in milliseconds; absent = transport default.
    pub write_timeout: Option<u64>,
}

/// The module boundary consumed by the host runtime.
///
/// Holds the external collaborators (certificate resources, content-handle
/// resolution, cookie persistence) and the once-configured client instance.
pub struct PinningModule {
    certs: Box<dyn CertificateSource>,
    files: Arc<dyn FileResolver>,
    jar: Arc<CookieJar>,
    client: OnceLock<Arc<HttpClient>>,
}

impl PinningModule {
    /// Module with default collaborators: filesystem file resolution and no
    /// cookie persistence.
    pub fn new(certs: Box<dyn CertificateSource>) -> Self {
        Self::with_collaborators(certs, Arc::new(FsResolver), Box::new(NullSink))
    }

    pub fn with_collaborators(
        certs: Box<dyn CertificateSource>,
        files: Arc<dyn FileResolver>,
        sink: Box<dyn CookieSink>,
    ) -> Self {
        Self {
            certs,
            files,
            jar: Arc::new(CookieJar::with_sink(sink)),
            client: OnceLock::new(),
        }
    }

    /// Configure pinning and construct the client instance.
    ///
    /// The first successful configuration wins for the module's lifetime;
    /// once a client exists (configured or lazily defaulted by `fetch`),
    /// further calls are no-ops. On failure no instance is created and the
    /// caller may retry.
    pub fn configure_pinning(&self, hostname: &str, options: &PinningOptions) -> Result<()> {
        if self.client.get().is_some() {
            tracing::debug!(host = hostname, "client already configured, ignoring");
            return Ok(());
        }

        let pin_set = options.certs.clone().unwrap_or_default();
        let trust = TrustConfig::configure(
            &pin_set,
            options.trust == Some(true),
            self.certs.as_ref(),
        )?;
        tracing::info!(host = hostname, trust = ?trust, "configured TLS trust");

        let timeouts = Timeouts::client_defaults()
            .with_millis(options.read_timeout, options.write_timeout);
        let client = Arc::new(HttpClient::new(
            TlsConnector::with_trust(Arc::new(trust)),
            self.jar.clone(),
            timeouts,
        ));
        // Losing this race means a concurrent configuration won; that one
        // stands.
        let _ = self.client.set(client);
        Ok(())
    }

    /// Execute a fetch against the configured client.
    ///
    /// If no client has been configured, an unpinned default transport
    /// (platform trust, default timeouts) is installed so fetch never
    /// hard-fails for lack of prior configuration.
    pub async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<Response> {
        let request = BuiltRequest::build(url, options, self.files.as_ref())?;
        self.client().fetch(request).await
    }

    /// Fetch from the host's dynamic option structure.
    pub async fn fetch_value(&self, url: &str, options: &serde_json::Value) -> Result<Response> {
        let options = RequestOptions::from_value(options)?;
        self.fetch(url, &options).await
    }

    /// Name→value cookies for a domain (with or without a leading `www.`).
    pub fn get_cookies(&self, domain: &str) -> Result<HashMap<String, String>> {
        self.jar.get_cookies(domain)
    }

    /// Remove a cookie by name across every host.
    pub fn remove_cookie_by_name(&self, name: &str) {
        self.jar.remove_cookie_by_name(name);
    }

    /// Cancel all queued and running calls carrying this tag. No-op when
    /// nothing matches or no client exists yet.
    pub fn cancel(&self, tag: &str) {
        if let Some(client) = self.client.get() {
            client.cancel(tag);
        }
    }

    /// Shared cookie jar (exposed for the host's own bookkeeping).
    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    fn client(&self) -> &Arc<HttpClient> {
        self.client.get_or_init(|| {
            tracing::warn!("fetch before configuration: using unpinned default transport");
            Arc::new(HttpClient::new(
                TlsConnector::new(),
                self.jar.clone(),
                Timeouts::client_defaults(),
            ))
        })
    }
}
