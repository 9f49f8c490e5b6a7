use boring::pkey::PKey;
use boring::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod};
use boring::x509::X509;

/// Generate a self-signed certificate for 127.0.0.1/localhost and return an
/// SslAcceptorBuilder plus the certificate PEM bytes (the cert is its own
/// trust anchor since it is self-signed).
pub fn generate_cert_bundle() -> (SslAcceptorBuilder, Vec<u8>) {
    let subject_alt_names = vec!["127.0.0.1".to_string(), "localhost".to_string()];

    let cert =
        rcgen::generate_simple_self_signed(subject_alt_names).expect("Failed to generate cert");
    let cert_pem = cert.cert.pem();
    let key_pem = cert.signing_key.serialize_pem();

    let pkey = PKey::private_key_from_pem(key_pem.as_bytes()).expect("Failed to parse private key");
    let x509 = X509::from_pem(cert_pem.as_bytes()).expect("Failed to parse certificate");

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
        .expect("Failed to create SslAcceptor builder");
    builder
        .set_private_key(&pkey)
        .expect("Failed to set private key");
    builder
        .set_certificate(&x509)
        .expect("Failed to set certificate");

    (builder, cert_pem.into_bytes())
}

/// Write certificate bytes as `<identifier>.cer` into a fresh bundle
/// directory and return the directory path.
pub fn write_bundle(identifier: &str, cert_pem: &[u8]) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "pinfetch-bundle-{}-{}",
        identifier,
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("Failed to create bundle dir");
    std::fs::write(dir.join(format!("{identifier}.cer")), cert_pem)
        .expect("Failed to write certificate");
    dir
}
