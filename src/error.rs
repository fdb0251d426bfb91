//! Error types for the mailin server.
//!
//! Protocol mistakes made by a client are answered with replies and never
//! surface here. These types cover the transport, TLS setup and configuration.

use std::io;

use thiserror::Error;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection was already closed when it was used.
    #[error("Connection closed")]
    Closed,
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during the TLS handshake.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {reason}")]
    CertificateLoad { path: String, reason: String },

    /// Failed to load TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// `STARTTLS` was accepted but no TLS configuration is available.
    #[error("TLS upgrade failed: {0}")]
    UpgradeFailed(String),

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading from or writing to the client failed.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The transport could not be upgraded after `STARTTLS`.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Connection(ConnectionError::Io(err))
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;
