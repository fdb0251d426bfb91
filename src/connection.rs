use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};

use crate::error::{ConnectionError, ConnectionResult, TlsError, TlsResult};

/// PEM encoded certificate material enabling `STARTTLS`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

impl TlsContext {
    /// Load the certificate chain and key into a server configuration that
    /// does not ask clients for certificates.
    #[tracing::instrument(level = "trace", err)]
    pub fn load(&self) -> TlsResult<Arc<ServerConfig>> {
        let certs = load_certs(&self.certificate)?;
        let key = load_key(&self.key)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Arc::new(config))
    }
}

fn load_certs(path: &Path) -> TlsResult<Vec<CertificateDer<'static>>> {
    let load_error = |reason: String| TlsError::CertificateLoad {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| load_error(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| load_error(e.to_string()))?;

    if certs.is_empty() {
        return Err(load_error("No certificates found".to_string()));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let load_error = |reason: String| TlsError::KeyLoad {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| load_error(e.to_string()))?;

    match rustls_pemfile::read_one(&mut BufReader::new(file))
        .map_err(|e| load_error(e.to_string()))?
    {
        Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
        Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
        _ => Err(load_error(
            "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)".to_string(),
        )),
    }
}

/// What was negotiated during a TLS handshake.
#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    cipher: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or_else(|| TlsError::UpgradeFailed("No protocol version".to_string()))?,
            cipher: conn
                .negotiated_cipher_suite()
                .ok_or_else(|| TlsError::UpgradeFailed("No cipher suite".to_string()))?,
        })
    }

    pub fn proto(&self) -> String {
        self.version.as_str().unwrap_or_default().to_string()
    }

    pub fn cipher(&self) -> String {
        self.cipher.suite().as_str().unwrap_or_default().to_string()
    }
}

/// The transport under a session. It starts out plain and may be swapped for
/// a TLS stream over the same underlying stream exactly once.
pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    Plain { stream: Stream },
    Tls { stream: Box<TlsStream<Stream>> },
    Closed,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub const fn new(stream: Stream) -> Self {
        Self::Plain { stream }
    }

    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Write `bytes` in full and flush them to the client.
    pub async fn send(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        match self {
            Self::Plain { stream } => {
                stream.write_all(bytes).await?;
                stream.flush().await?;
            }
            Self::Tls { stream } => {
                stream.write_all(bytes).await?;
                stream.flush().await?;
            }
            Self::Closed => return Err(ConnectionError::Closed),
        }

        Ok(())
    }

    /// Read the next chunk. `Ok(0)` means the client closed its side.
    pub async fn receive(&mut self, buf: &mut [u8]) -> ConnectionResult<usize> {
        Ok(match self {
            Self::Plain { stream } => stream.read(buf).await?,
            Self::Tls { stream } => stream.read(buf).await?,
            Self::Closed => 0,
        })
    }

    /// Run the server side of a TLS handshake over the current stream.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn upgrade(self, acceptor: TlsAcceptor) -> TlsResult<(Self, TlsInfo)> {
        tracing::debug!("Upgrading connection ...");

        match self {
            Self::Plain { stream } => {
                let stream = acceptor.accept(stream).await?;
                let info = TlsInfo::of(stream.get_ref().1)?;

                Ok((
                    Self::Tls {
                        stream: Box::new(stream),
                    },
                    info,
                ))
            }
            Self::Tls { .. } => Err(TlsError::UpgradeFailed(
                "Connection is already secure".to_string(),
            )),
            Self::Closed => Err(TlsError::UpgradeFailed("Connection is closed".to_string())),
        }
    }

    /// Shut the write side down and drop the stream.
    pub async fn close(&mut self) -> ConnectionResult<()> {
        let result = match self {
            Self::Plain { stream } => stream.shutdown().await,
            Self::Tls { stream } => stream.shutdown().await,
            Self::Closed => Ok(()),
        };

        *self = Self::Closed;
        Ok(result?)
    }
}
