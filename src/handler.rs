//! The collaborators a session reports to.
//!
//! A session never stores, relays or verifies anything itself. Completed
//! messages, rejected senders, credential checks and transport failures are
//! all handed to a [`TransactionHandler`] shared by every session of a server.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::{envelope::Message, error::SessionError, internal};

/// What a handler may learn about the session asking it to verify credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    /// The name the client gave in `HELO`/`EHLO`.
    pub client: Option<String>,
    pub secure: bool,
}

#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// Called exactly once per completed message.
    async fn deliver(&self, message: Message);

    /// Called when a sender declared a `SIZE` above the configured maximum.
    async fn reject_sender(&self, sender: &str, recipients: &[String]) {
        internal!(
            level = INFO,
            "Rejected <{sender}> with {} recipient(s): declared size too large",
            recipients.len()
        );
    }

    /// Check a username and password. No credentials are valid unless this is
    /// overridden.
    async fn verify(
        &self,
        session: &SessionInfo,
        username: &str,
        password: &str,
        identity: Option<&str>,
    ) -> bool {
        let _ = (password, identity);
        internal!(
            level = WARN,
            "No verifier configured, refusing {username} from {}",
            session.peer
        );
        false
    }

    /// Called when reading from, writing to or upgrading the transport fails.
    async fn transport_error(&self, peer: SocketAddr, error: &SessionError) {
        internal!(level = ERROR, "[{peer}] {error}");
    }
}

/// Logs each message and discards it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait]
impl TransactionHandler for LogHandler {
    async fn deliver(&self, message: Message) {
        internal!(level = INFO, "Received message {message}");
        tracing::debug!("{}", message.text());
    }
}
