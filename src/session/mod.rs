use std::{net::SocketAddr, sync::Arc};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

use crate::{
    auth::Negotiation,
    connection::{Connection, TlsContext},
    envelope::Transaction,
    error::{SessionError, TlsError, TlsResult},
    handler::{SessionInfo, TransactionHandler},
    internal, outgoing,
    reassembly::{OverflowPolicy, Reassembler},
    reply::Reply,
    status::Status,
};

mod auth;
mod dispatch;
mod io;

/// What the session does once a unit has been handled.
#[derive(PartialEq, Eq, Debug)]
pub enum Event {
    ConnectionKeepAlive,
    /// `STARTTLS` was accepted; the transport must be upgraded before reading on.
    ConnectionUpgrade,
    ConnectionClose,
}

fn default_max_message_size() -> usize {
    1_000_000
}

fn default_max_line_length() -> usize {
    4096
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// The name announced in the greeting. Falls back to `$HOSTNAME`, then
    /// `localhost`, when empty.
    #[serde(default)]
    pub hostname: String,
    /// Maximum message size in bytes, advertised via `SIZE`. 0 disables the limit.
    ///
    /// This is checked against the declared `SIZE=` of `MAIL FROM` and against
    /// the bytes actually received during `DATA`. Either way the client gets 552.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Command lines longer than this are dropped and answered with 500.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Certificate material; `STARTTLS` is offered when present.
    #[serde(default)]
    pub tls: Option<TlsContext>,
    /// Offer `AUTH PLAIN`.
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(skip)]
    tls_config: Option<Arc<ServerConfig>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            max_message_size: default_max_message_size(),
            max_line_length: default_max_line_length(),
            tls: None,
            auth: false,
            overflow: OverflowPolicy::default(),
            tls_config: None,
        }
    }
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Load the configured certificate material, if any, so `STARTTLS` can
    /// be offered.
    pub fn load_tls(&mut self) -> TlsResult<()> {
        if let Some(context) = &self.tls {
            self.tls_config = Some(context.load()?);
        }

        Ok(())
    }

    pub const fn tls_enabled(&self) -> bool {
        self.tls_config.is_some()
    }

    /// The name announced to clients.
    pub fn hostname(&self) -> String {
        if self.hostname.is_empty() {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
        } else {
            self.hostname.clone()
        }
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the hostname used in the greeting and `EHLO` reply
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Set the maximum message size, 0 for unlimited
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the maximum command line length, 0 for unlimited
    #[must_use]
    pub const fn with_max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Enable `STARTTLS` with an already built TLS configuration
    #[must_use]
    pub fn with_tls_config(mut self, config: Arc<ServerConfig>) -> Self {
        self.config.tls_config = Some(config);
        self
    }

    /// Enable or disable `AUTH PLAIN`
    #[must_use]
    pub const fn with_auth(mut self, auth: bool) -> Self {
        self.config.auth = auth;
        self
    }

    /// Set what happens once a message grows past the maximum size
    #[must_use]
    pub const fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// Build the final `SessionConfig`
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// The protocol state of a single connection.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    peer: SocketAddr,
    connection: Connection<Stream>,
    hostname: Arc<str>,
    config: Arc<SessionConfig>,
    handler: Arc<dyn TransactionHandler>,
    reassembler: Reassembler,
    /// Set by a successful `HELO`/`EHLO`, cleared again by `STARTTLS`.
    greeted: bool,
    client: Option<String>,
    transaction: Option<Transaction>,
    /// The username the client authenticated as.
    authenticated: Option<String>,
    negotiation: Option<Negotiation>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        config: Arc<SessionConfig>,
        handler: Arc<dyn TransactionHandler>,
    ) -> Self {
        tracing::debug!("Config: {config:?}");

        Self {
            peer,
            connection: Connection::new(stream),
            hostname: config.hostname().into(),
            reassembler: Reassembler::new(
                config.max_message_size,
                config.max_line_length,
                config.overflow,
            ),
            config,
            handler,
            greeted: false,
            client: None,
            transaction: None,
            authenticated: None,
            negotiation: None,
        }
    }

    pub const fn is_secure(&self) -> bool {
        self.connection.is_secure()
    }

    pub const fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            peer: self.peer,
            client: self.client.clone(),
            secure: self.is_secure(),
        }
    }

    /// Greet the client and serve it until it quits or disconnects.
    ///
    /// Transport failures are reported to the handler before being returned.
    #[tracing::instrument(level = "trace", skip_all, fields(peer = %self.peer))]
    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!("Connected");

        let result = self.serve().await;
        if let Err(err) = &result {
            self.handler.transport_error(self.peer, err).await;
        }

        internal!("Connection closed");
        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        let greeting = Reply::new(Status::ServiceReady, format!("{} ESMTP", self.hostname));
        self.reply(greeting).await?;

        let mut received = [0; 4096];

        while self.is_open() {
            let bytes_read = self.connection.receive(&mut received).await?;
            if bytes_read == 0 {
                // The other side has closed the connection or is done writing,
                // then so are we.
                internal!("Client disconnected");
                break;
            }

            match self.process(&received[..bytes_read]).await? {
                Event::ConnectionKeepAlive => {}
                Event::ConnectionUpgrade => self.upgrade().await?,
                Event::ConnectionClose => {
                    if let Err(err) = self.connection.close().await {
                        tracing::debug!("Error shutting down connection: {err}");
                    }
                }
            }
        }

        Ok(())
    }

    /// Swap the plain transport for TLS over the same stream.
    ///
    /// Anything still buffered arrived in plaintext and is dropped, together
    /// with all state established before the handshake.
    async fn upgrade(&mut self) -> Result<(), SessionError> {
        let Some(tls_config) = self.config.tls_config.as_ref() else {
            return Err(TlsError::UpgradeFailed("No TLS configuration".to_string()).into());
        };

        let acceptor = TlsAcceptor::from(Arc::clone(tls_config));
        let connection = std::mem::replace(&mut self.connection, Connection::Closed);
        let (connection, info) = connection.upgrade(acceptor).await?;
        self.connection = connection;

        internal!(
            level = DEBUG,
            "Connection upgraded to {} using {}",
            info.proto(),
            info.cipher()
        );

        if self.reassembler.pending() > 0 {
            internal!(
                level = WARN,
                "Discarding {} bytes received before the TLS handshake",
                self.reassembler.pending()
            );
        }

        self.reassembler.clear();
        self.greeted = false;
        self.client = None;
        self.transaction = None;
        self.authenticated = None;
        self.negotiation = None;

        Ok(())
    }

    async fn reply(&mut self, reply: Reply) -> Result<(), SessionError> {
        outgoing!("{reply}");
        self.connection.send(&reply.encode()).await?;
        Ok(())
    }

    /// Send `reply` and carry on reading.
    async fn respond(&mut self, reply: Reply) -> Result<Event, SessionError> {
        self.reply(reply).await?;
        Ok(Event::ConnectionKeepAlive)
    }
}
