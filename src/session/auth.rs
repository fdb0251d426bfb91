use tokio::io::{AsyncRead, AsyncWrite};

use super::{Event, Session};
use crate::{
    auth::{AuthError, Credentials, Negotiation},
    error::SessionError,
    internal,
    reply::Reply,
    status::Status,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Feed a client response into a negotiation, which ends with it.
    pub(super) async fn negotiate(
        &mut self,
        negotiation: Negotiation,
        response: &str,
    ) -> Result<Event, SessionError> {
        match negotiation.respond(response) {
            Ok(credentials) => self.verify(credentials).await,
            Err(AuthError::Cancelled) => {
                internal!(level = DEBUG, "Client cancelled authentication");
                self.respond(Reply::syntax("Authentication cancelled")).await
            }
            Err(err) => {
                internal!(level = DEBUG, "{err}");
                self.respond(Reply::syntax(err.to_string())).await
            }
        }
    }

    async fn verify(&mut self, credentials: Credentials) -> Result<Event, SessionError> {
        let Credentials {
            identity,
            username,
            password,
        } = credentials;

        let verified = self
            .handler
            .verify(&self.info(), &username, &password, identity.as_deref())
            .await;

        if verified {
            internal!(level = INFO, "Authenticated as {username}");
            self.authenticated = Some(username);
            self.respond(Reply::new(
                Status::AuthSucceeded,
                "Authentication successful",
            ))
            .await
        } else {
            internal!(level = INFO, "Authentication failed for {username}");
            self.respond(Reply::new(
                Status::InvalidCredentials,
                "Authentication credentials invalid",
            ))
            .await
        }
    }
}
