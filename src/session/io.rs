use tokio::io::{AsyncRead, AsyncWrite};

use super::{Event, Session};
use crate::{
    command::Command,
    envelope::Message,
    error::SessionError,
    incoming, internal,
    reassembly::{Unit, unstuff},
    reply::Reply,
    status::Status,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Feed one received chunk through the reassembler and act on every
    /// complete unit it yields, in arrival order.
    ///
    /// Stops early when a unit requires the transport to change; whatever
    /// is still buffered at that point is left to [`Session::upgrade`].
    pub(super) async fn process(&mut self, chunk: &[u8]) -> Result<Event, SessionError> {
        self.reassembler.push(chunk);

        while let Some(unit) = self.reassembler.next_unit() {
            let event = match unit {
                Unit::Line(line) => self.line(&line).await?,
                Unit::Blob(body) => self.message(&body).await?,
                Unit::Overflow => self.respond(Self::too_large()).await?,
                Unit::Rejected => {
                    self.transaction = None;
                    self.respond(Self::too_large()).await?
                }
                Unit::LineTooLong => {
                    internal!(level = DEBUG, "Dropped a command line that was too long");
                    self.respond(Reply::new(Status::SyntaxError, "Line too long"))
                        .await?
                }
            };

            if event != Event::ConnectionKeepAlive {
                return Ok(event);
            }
        }

        Ok(Event::ConnectionKeepAlive)
    }

    async fn line(&mut self, line: &str) -> Result<Event, SessionError> {
        if let Some(negotiation) = self.negotiation.take() {
            incoming!("<{} response>", negotiation.mechanism());
            return self.negotiate(negotiation, line).await;
        }

        let command = Command::try_from(line).unwrap_or_else(|e| e);
        incoming!("{command}");

        self.dispatch(command).await
    }

    /// A body arrived in full: hand it to the delivery sink with the pending
    /// envelope.
    async fn message(&mut self, body: &[u8]) -> Result<Event, SessionError> {
        let Some(transaction) = self.transaction.take() else {
            return self.respond(Reply::bad_sequence()).await;
        };

        if self.config.max_message_size > 0 && body.len() > self.config.max_message_size {
            internal!(
                level = INFO,
                "Message from <{}> is {} bytes, over the {} byte limit",
                transaction.sender,
                body.len(),
                self.config.max_message_size
            );
            return self.respond(Self::too_large()).await;
        }

        let message = Message::new(transaction, unstuff(body))
            .with_authenticated(self.authenticated.clone())
            .with_secure(self.is_secure());

        internal!(level = INFO, "Accepted message {message}");
        self.handler.deliver(message).await;

        self.respond(Reply::ok()).await
    }

    pub(super) fn too_large() -> Reply {
        Reply::new(
            Status::ExceededStorage,
            "Message size exceeds fixed maximum message size",
        )
    }
}
