//! Trust configuration: certificate pinning or the explicit trust-all bypass.
//!
//! A pin set is an ordered list of certificate identifiers. Each identifier
//! resolves to a bundled resource named `<identifier>.cer` (DER or PEM X.509).
//! Configuration is all-or-nothing: any identifier that fails to resolve or
//! parse aborts with the failing identifier and no trust store is produced.

use std::io;
use std::path::PathBuf;

use boring::x509::X509;

use crate::error::{Error, Result};

/// Resolves a certificate identifier to the raw bytes of its bundled
/// `.cer` resource. Implemented by the host; this crate never decides where
/// certificates live.
pub trait CertificateSource: Send + Sync {
    fn load(&self, identifier: &str) -> io::Result<Vec<u8>>;
}

/// Certificate source backed by a directory of `<identifier>.cer` files.
#[derive(Debug, Clone)]
pub struct BundleDir {
    root: PathBuf,
}

impl BundleDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CertificateSource for BundleDir {
    fn load(&self, identifier: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(format!("{identifier}.cer")))
    }
}

/// The trust decision for a client instance. Exactly one variant is active
/// per configured client; selection is irrevocable until reconfiguration.
pub enum TrustConfig {
    /// TLS trust restricted to exactly these anchors. Server certificates
    /// chaining to anything else are rejected during the handshake.
    Pinned { anchors: Vec<X509> },

    /// Accept every server certificate and every hostname. This disables the
    /// primary security property of TLS and exists only as an explicit,
    /// caller-requested bypass.
    TrustAll,
}

impl TrustConfig {
    /// Build a trust configuration from a pin set.
    ///
    /// `trust_all == true` short-circuits to [`TrustConfig::TrustAll`]
    /// without touching the certificate source. An empty pin set also yields
    /// `TrustAll`: an empty pin list disables pinning rather than rejecting
    /// all connections (the original behavior, preserved).
    pub fn configure(
        pin_set: &[String],
        trust_all: bool,
        source: &dyn CertificateSource,
    ) -> Result<Self> {
        if trust_all {
            tracing::warn!("trust-all enabled: server certificates and hostnames are not verified");
            return Ok(Self::TrustAll);
        }
        if pin_set.is_empty() {
            tracing::warn!("empty pin set: pinning disabled, all certificates accepted");
            return Ok(Self::TrustAll);
        }

        let mut anchors = Vec::with_capacity(pin_set.len());
        for identifier in pin_set {
            let bytes = source
                .load(identifier)
                .map_err(|e| Error::tls_config(identifier, format!("resource not loadable: {e}")))?;
            let cert = parse_certificate(&bytes)
                .map_err(|e| Error::tls_config(identifier, format!("not a valid X.509 certificate: {e}")))?;
            anchors.push(cert);
        }
        Ok(Self::Pinned { anchors })
    }

    /// Whether this configuration verifies server certificates at all.
    pub fn verifies_peer(&self) -> bool {
        matches!(self, Self::Pinned { .. })
    }
}

impl std::fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pinned { anchors } => f
                .debug_struct("Pinned")
                .field("anchors", &anchors.len())
                .finish(),
            Self::TrustAll => f.write_str("TrustAll"),
        }
    }
}

/// Parse certificate bytes as DER, falling back to PEM.
fn parse_certificate(bytes: &[u8]) -> std::result::Result<X509, boring::error::ErrorStack> {
    X509::from_der(bytes).or_else(|_| X509::from_pem(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, Vec<u8>>);

    impl CertificateSource for MapSource {
        fn load(&self, identifier: &str) -> io::Result<Vec<u8>> {
            self.0
                .get(identifier)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, identifier.to_string()))
        }
    }

    fn self_signed_pem() -> Vec<u8> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        cert.cert.pem().into_bytes()
    }

    #[test]
    fn test_trust_flag_skips_certificate_loading() {
        // Source that fails on any access: trust-all must not touch it.
        let source = MapSource(HashMap::new());
        let config =
            TrustConfig::configure(&["missing".to_string()], true, &source).unwrap();
        assert!(matches!(config, TrustConfig::TrustAll));
        assert!(!config.verifies_peer());
    }

    #[test]
    fn test_empty_pin_set_disables_pinning() {
        let source = MapSource(HashMap::new());
        let config = TrustConfig::configure(&[], false, &source).unwrap();
        assert!(matches!(config, TrustConfig::TrustAll));
    }

    #[test]
    fn test_pin_set_loads_all_anchors() {
        let mut certs = HashMap::new();
        certs.insert("ca1".to_string(), self_signed_pem());
        certs.insert("ca2".to_string(), self_signed_pem());
        let source = MapSource(certs);

        let config = TrustConfig::configure(
            &["ca1".to_string(), "ca2".to_string()],
            false,
            &source,
        )
        .unwrap();
        match config {
            TrustConfig::Pinned { anchors } => assert_eq!(anchors.len(), 2),
            TrustConfig::TrustAll => panic!("expected pinned configuration"),
        }
    }

    #[test]
    fn test_missing_identifier_fails_all_or_nothing() {
        let mut certs = HashMap::new();
        certs.insert("ca1".to_string(), self_signed_pem());
        let source = MapSource(certs);

        let err = TrustConfig::configure(
            &["ca1".to_string(), "absent".to_string()],
            false,
            &source,
        )
        .unwrap_err();
        match err {
            Error::TlsConfig { identifier, .. } => assert_eq!(identifier, "absent"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_certificate_fails_with_identifier() {
        let mut certs = HashMap::new();
        certs.insert("bad".to_string(), b"not a certificate".to_vec());
        let source = MapSource(certs);

        let err = TrustConfig::configure(&["bad".to_string()], false, &source).unwrap_err();
        match err {
            Error::TlsConfig { identifier, .. } => assert_eq!(identifier, "bad"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bundle_dir_resolves_by_convention() {
        let dir = std::env::temp_dir().join("pinfetch-bundle-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("myca.cer"), self_signed_pem()).unwrap();

        let source = BundleDir::new(&dir);
        assert!(source.load("myca").is_ok());
        assert!(source.load("other").is_err());
    }
}
