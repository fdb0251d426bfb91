use tokio::io::{AsyncRead, AsyncWrite};

use super::{Event, Session};
use crate::{
    auth::{Mechanism, Negotiation},
    command::{Command, HeloVariant},
    envelope::Transaction,
    error::SessionError,
    internal,
    reply::Reply,
    status::Status,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Act on one command line. Exactly one reply is written, unless the
    /// command opens a credential negotiation awaiting a response.
    pub(super) async fn dispatch(&mut self, command: Command) -> Result<Event, SessionError> {
        if !self.greeted && !command.verb().allowed_before_greeting() {
            return self.respond(Reply::bad_sequence()).await;
        }

        match command {
            Command::Helo(variant) => self.helo(variant).await,
            Command::StartTls => self.starttls().await,
            Command::MailFrom { sender, size } => self.mail_from(sender, size).await,
            Command::RcptTo(recipient) => self.rcpt_to(recipient).await,
            Command::Data => self.data().await,
            Command::Auth {
                mechanism,
                initial_response,
            } => self.auth(&mechanism, initial_response.as_deref()).await,
            Command::Rset => {
                self.transaction = None;
                self.respond(Reply::ok()).await
            }
            Command::Noop => self.respond(Reply::ok()).await,
            Command::Quit => {
                self.reply(Reply::new(Status::GoodBye, "Bye")).await?;
                Ok(Event::ConnectionClose)
            }
            Command::Unknown(_) => self.respond(Reply::not_implemented()).await,
            Command::Invalid { reason, .. } => self.respond(Reply::syntax(reason)).await,
        }
    }

    /// The extensions offered in reply to `EHLO`, given the current state.
    pub(super) fn capabilities(&self) -> Vec<String> {
        let mut capabilities = vec![
            "PIPELINING".to_string(),
            "8BITMIME".to_string(),
            "SMTPUTF8".to_string(),
        ];

        if self.config.tls_enabled() && !self.is_secure() {
            capabilities.push("STARTTLS".to_string());
        }

        if self.config.auth {
            let mechanisms = Mechanism::SUPPORTED
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            capabilities.push(format!("AUTH {}", mechanisms.join(" ")));
        }

        capabilities.push(format!("SIZE {}", self.config.max_message_size));
        capabilities
    }

    async fn helo(&mut self, variant: HeloVariant) -> Result<Event, SessionError> {
        if self.greeted {
            return self.respond(Reply::bad_sequence()).await;
        }

        let reply = match &variant {
            HeloVariant::Helo(_) => Reply::new(Status::Ok, self.hostname.to_string()),
            HeloVariant::Ehlo(_) => {
                let mut lines = vec![self.hostname.to_string()];
                lines.extend(self.capabilities());
                Reply::new(Status::Ok, lines.join("\n"))
            }
        };

        let (HeloVariant::Helo(client) | HeloVariant::Ehlo(client)) = variant;
        internal!(level = DEBUG, "Client introduced itself as {client}");

        self.greeted = true;
        self.client = Some(client);
        self.respond(reply).await
    }

    async fn starttls(&mut self) -> Result<Event, SessionError> {
        if !self.config.tls_enabled() {
            return self
                .respond(Reply::new(Status::NotImplemented, "STARTTLS not supported"))
                .await;
        }

        if self.is_secure() {
            return self.respond(Reply::bad_sequence()).await;
        }

        self.reply(Reply::new(Status::ServiceReady, "Ready to start TLS"))
            .await?;
        Ok(Event::ConnectionUpgrade)
    }

    async fn mail_from(
        &mut self,
        sender: String,
        size: Option<usize>,
    ) -> Result<Event, SessionError> {
        let max = self.config.max_message_size;

        if let Some(size) = size
            && max > 0
            && size > max
        {
            internal!(
                level = INFO,
                "Rejecting <{sender}>: declared size {size} exceeds {max}"
            );

            let recipients = self
                .transaction
                .as_ref()
                .map(|transaction| transaction.recipients.clone())
                .unwrap_or_default();
            self.handler.reject_sender(&sender, &recipients).await;

            return self.respond(Self::too_large()).await;
        }

        self.transaction = Some(Transaction::new(sender));
        self.respond(Reply::ok()).await
    }

    async fn rcpt_to(&mut self, recipient: String) -> Result<Event, SessionError> {
        let Some(transaction) = self.transaction.as_mut() else {
            return self.respond(Reply::bad_sequence()).await;
        };

        transaction.add_recipient(recipient);
        self.respond(Reply::ok()).await
    }

    async fn data(&mut self) -> Result<Event, SessionError> {
        if !self.transaction.as_ref().is_some_and(Transaction::ready) {
            return self.respond(Reply::bad_sequence()).await;
        }

        self.reply(Reply::new(
            Status::StartMailInput,
            "End data with <CR><LF>.<CR><LF>",
        ))
        .await?;

        self.reassembler.begin_blob();
        Ok(Event::ConnectionKeepAlive)
    }

    async fn auth(
        &mut self,
        mechanism: &str,
        initial_response: Option<&str>,
    ) -> Result<Event, SessionError> {
        if !self.config.auth {
            return self
                .respond(Reply::new(Status::NotImplemented, "AUTH not supported"))
                .await;
        }

        if self.authenticated.is_some() {
            return self.respond(Reply::bad_sequence()).await;
        }

        let Some(mechanism) = Mechanism::from_name(mechanism) else {
            return self
                .respond(Reply::new(
                    Status::UnrecognisedMechanism,
                    "Unrecognised authentication mechanism",
                ))
                .await;
        };

        let negotiation = Negotiation::new(mechanism);

        match initial_response {
            Some(response) => self.negotiate(negotiation, response).await,
            None => {
                self.negotiation = Some(negotiation);
                self.respond(Reply::bare(Status::AuthContinue)).await
            }
        }
    }
}
