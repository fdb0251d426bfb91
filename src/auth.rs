//! Credential negotiation for the `AUTH` command.
//!
//! A negotiation is created when `AUTH` names a supported mechanism and lives
//! on the session until the client's credentials are complete. Only `PLAIN`
//! is supported, which completes in a single response, either inline with the
//! `AUTH` command or as the line following a bare `334` prompt.

use core::fmt::{self, Debug, Display, Formatter};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
}

impl Mechanism {
    pub const SUPPORTED: &'static [Self] = &[Self::Plain];

    /// Look up a mechanism by its (already uppercased) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|mechanism| mechanism.to_string() == name)
    }
}

impl Display for Mechanism {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => fmt.write_str("PLAIN"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid base64 in authentication response: {0}")]
    Base64(String),

    #[error("Malformed {0} authentication response")]
    Malformed(Mechanism),

    #[error("Authentication cancelled")]
    Cancelled,
}

impl From<base64::DecodeError> for AuthError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err.to_string())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The authorisation identity, when the client asked to act as someone else.
    pub identity: Option<String>,
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decode a `PLAIN` response: base64 of `[authzid] NUL username NUL password`.
pub fn decode_plain(payload: &str) -> Result<Credentials, AuthError> {
    let decoded = BASE64.decode(payload.trim())?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed(Mechanism::Plain))?;

    let fields = decoded.split('\0').collect::<Vec<_>>();
    let (identity, username, password) = match fields.as_slice() {
        [identity, username, password] => (
            Some(*identity).filter(|id| !id.is_empty()),
            *username,
            *password,
        ),
        [username, password] => (None, *username, *password),
        _ => return Err(AuthError::Malformed(Mechanism::Plain)),
    };

    if username.is_empty() {
        return Err(AuthError::Malformed(Mechanism::Plain));
    }

    Ok(Credentials {
        identity: identity.map(str::to_string),
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// An exchange in progress, awaiting the client's response to a bare `334`.
#[derive(Debug)]
pub struct Negotiation {
    mechanism: Mechanism,
}

impl Negotiation {
    pub const fn new(mechanism: Mechanism) -> Self {
        Self { mechanism }
    }

    pub const fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Feed the client response (a whole line, base64 encoded).
    pub fn respond(&self, response: &str) -> Result<Credentials, AuthError> {
        if response.trim() == "*" {
            return Err(AuthError::Cancelled);
        }

        match self.mechanism {
            Mechanism::Plain => decode_plain(response),
        }
    }
}

#[cfg(test)]
mod test {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use pretty_assertions::assert_eq;

    use super::{AuthError, Credentials, Mechanism, Negotiation, decode_plain};

    #[test]
    fn mechanism_lookup() {
        assert_eq!(Mechanism::from_name("PLAIN"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::from_name("LOGIN"), None);
        assert_eq!(Mechanism::from_name("CRAM-MD5"), None);
    }

    #[test]
    fn plain_without_identity() {
        assert_eq!(
            decode_plain(&BASE64.encode("\0user\0pass")),
            Ok(Credentials {
                identity: None,
                username: "user".to_string(),
                password: "pass".to_string(),
            })
        );
    }

    #[test]
    fn plain_with_identity() {
        assert_eq!(
            decode_plain(&BASE64.encode("admin\0user\0pass")),
            Ok(Credentials {
                identity: Some("admin".to_string()),
                username: "user".to_string(),
                password: "pass".to_string(),
            })
        );
    }

    #[test]
    fn plain_two_fields() {
        assert_eq!(
            decode_plain(&BASE64.encode("user\0pass")),
            Ok(Credentials {
                identity: None,
                username: "user".to_string(),
                password: "pass".to_string(),
            })
        );
    }

    #[test]
    fn plain_malformed() {
        assert!(matches!(
            decode_plain("not base64!"),
            Err(AuthError::Base64(_))
        ));
        assert_eq!(
            decode_plain(&BASE64.encode("justuser")),
            Err(AuthError::Malformed(Mechanism::Plain))
        );
        assert_eq!(
            decode_plain(&BASE64.encode("a\0b\0c\0d")),
            Err(AuthError::Malformed(Mechanism::Plain))
        );
        assert_eq!(
            decode_plain(&BASE64.encode("\0\0pass")),
            Err(AuthError::Malformed(Mechanism::Plain))
        );
    }

    #[test]
    fn negotiation() {
        let negotiation = Negotiation::new(Mechanism::Plain);
        assert_eq!(negotiation.mechanism(), Mechanism::Plain);

        let credentials = negotiation.respond(&BASE64.encode("\0user\0pass")).unwrap();
        assert_eq!(credentials.username, "user");

        assert_eq!(
            Negotiation::new(Mechanism::Plain).respond("*"),
            Err(AuthError::Cancelled)
        );
    }

    #[test]
    fn password_is_not_debug_printed() {
        let credentials = decode_plain(&BASE64.encode("\0user\0hunter2")).unwrap();
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
