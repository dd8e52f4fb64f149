//! TLS wrapping for `linstor+ssl://` controllers.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::config::TlsSettings;
use crate::error::{ClientError, ClientResult};

/// Builds a rustls client configuration from the TLS settings.
///
/// Controllers normally run with certificates from a private CA, so a CA
/// bundle is required.
pub fn client_config(settings: &TlsSettings) -> ClientResult<ClientConfig> {
    let ca_file = settings.ca_file.as_deref().ok_or_else(|| {
        ClientError::Tls("an encrypted controller requires tls.ca_file to be set".into())
    })?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_file)? {
        roots
            .add(cert)
            .map_err(|e| ClientError::Tls(format!("invalid CA certificate: {e}")))?;
    }

    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ClientError::Tls(e.to_string()))?
    .with_root_certificates(roots);

    let config = match (&settings.cert_file, &settings.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let chain = load_certs(cert_file)?;
            let key = PrivateKeyDer::from_pem_file(key_file).map_err(|e| {
                ClientError::Tls(format!("failed to read key {}: {e}", key_file.display()))
            })?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| ClientError::Tls(format!("invalid client certificate: {e}")))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ClientError::Tls(
                "tls.cert_file and tls.key_file must be set together".into(),
            ));
        }
    };
    Ok(config)
}

fn load_certs(path: &Path) -> ClientResult<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ClientError::Tls(format!("failed to read {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ClientError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Performs the TLS handshake over an established TCP stream.
pub async fn wrap(
    stream: TcpStream,
    host: &str,
    settings: &TlsSettings,
) -> ClientResult<TlsStream<TcpStream>> {
    let name = settings.server_name.as_deref().unwrap_or(host);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|e| ClientError::Tls(format!("invalid server name '{name}': {e}")))?;

    let connector = TlsConnector::from(Arc::new(client_config(settings)?));
    let stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ClientError::Tls(format!("handshake with {name} failed: {e}")))?;

    debug!(server_name = %name, "TLS session established");
    Ok(stream)
}
