use core::fmt::{self, Display, Formatter};

/// The sender and recipients accumulated between `MAIL` and the end of `DATA`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub sender: String,
    pub recipients: Vec<String>,
}

impl Transaction {
    pub const fn new(sender: String) -> Self {
        Self {
            sender,
            recipients: Vec::new(),
        }
    }

    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        self.recipients.push(recipient.into());
    }

    /// Whether enough has been declared for `DATA` to begin.
    pub fn ready(&self) -> bool {
        !self.sender.is_empty() && !self.recipients.is_empty()
    }
}

/// A completed message, handed to the delivery sink exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub recipients: Vec<String>,
    /// The body with dot-transparency undone.
    pub message: Vec<u8>,
    /// The username the client authenticated as, if any.
    pub authenticated: Option<String>,
    /// Whether the body was received over TLS.
    pub secure: bool,
}

impl Message {
    pub fn new(transaction: Transaction, message: Vec<u8>) -> Self {
        Self {
            sender: transaction.sender,
            recipients: transaction.recipients,
            message,
            authenticated: None,
            secure: false,
        }
    }

    #[must_use]
    pub fn with_authenticated(mut self, username: Option<String>) -> Self {
        self.authenticated = username;
        self
    }

    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

impl Display for Message {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "<{}> -> [{}] ({} bytes)",
            self.sender,
            self.recipients
                .iter()
                .map(|rcpt| format!("<{rcpt}>"))
                .collect::<Vec<_>>()
                .join(", "),
            self.message.len()
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Message, Transaction};

    #[test]
    fn transaction_readiness() {
        let mut transaction = Transaction::new("a@x.com".to_string());
        assert!(!transaction.ready());

        transaction.add_recipient("b@x.com");
        assert!(transaction.ready());
        assert!(!Transaction::default().ready());
    }

    #[test]
    fn message_from_transaction() {
        let mut transaction = Transaction::new("a@x.com".to_string());
        transaction.add_recipient("b@x.com");
        transaction.add_recipient("c@x.com");

        let message = Message::new(transaction, b"hello\r\n".to_vec())
            .with_authenticated(Some("user".to_string()))
            .with_secure(true);

        assert_eq!(message.recipients, vec!["b@x.com", "c@x.com"]);
        assert_eq!(message.text(), "hello\r\n");
        assert_eq!(message.authenticated.as_deref(), Some("user"));
        assert_eq!(
            message.to_string(),
            "<a@x.com> -> [<b@x.com>, <c@x.com>] (7 bytes)"
        );
    }
}
