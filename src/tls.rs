//! TLS material loading.
//!
//! Certificate/key provisioning, rotation, and ACME are the
//! deployment's job, not the gateway's. This module only turns a
//! key+cert file pair into a `rustls::ServerConfig`, once, at startup.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

/// Load a TLS server configuration from a PEM certificate chain and a
/// PEM private key. Installs the `ring` crypto provider as a process-wide
/// default if none is installed yet (idempotent).
pub fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<rustls::ServerConfig>> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert_file = File::open(cert_path).map_err(|e| Error::Tls(format!("{cert_path}: {e}")))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Tls(format!("parsing {cert_path}: {e}")))?;

    let key_file = File::open(key_path).map_err(|e| Error::Tls(format!("{key_path}: {e}")))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| Error::Tls(format!("parsing {key_path}: {e}")))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {key_path}")))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}
