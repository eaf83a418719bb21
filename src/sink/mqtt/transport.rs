use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::error::ConnectError;

pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn Stream>;

/// Builds a TLS connector trusting only the certificates in `ca_file`.
pub fn tls_connector(ca_file: &Path) -> Result<TlsConnector, ConnectError> {
    debug!("Set CA certificates for MQTT client from {}", ca_file.display());
    let file = File::open(ca_file).map_err(|e| tls_error(ca_file, e))?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| tls_error(ca_file, e))?;
        roots.add(cert).map_err(|e| tls_error(ca_file, e))?;
    }
    if roots.is_empty() {
        return Err(tls_error(ca_file, "no certificates found"));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn tls_error(ca_file: &Path, e: impl std::fmt::Display) -> ConnectError {
    ConnectError::Tls(format!("{}: {e}", ca_file.display()))
}

pub async fn open(
    host: &str,
    port: u16,
    tls: Option<&TlsConnector>,
) -> Result<BoxedStream, ConnectError> {
    let tcp = TcpStream::connect((host, port)).await?;
    tcp.set_nodelay(true)?;

    match tls {
        None => Ok(Box::new(tcp)),
        Some(connector) => {
            let name = ServerName::try_from(host.to_string())
                .map_err(|e| ConnectError::Tls(e.to_string()))?;
            let stream = connector.connect(name, tcp).await?;
            Ok(Box::new(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ca_file_is_a_tls_error() {
        let err = tls_connector(Path::new("/nonexistent/ca_certs.pem")).err().unwrap();
        assert!(matches!(err, ConnectError::Tls(_)));
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a certificate\n").unwrap();
        let err = tls_connector(file.path()).err().unwrap();
        assert!(matches!(err, ConnectError::Tls(_)));
    }
}
