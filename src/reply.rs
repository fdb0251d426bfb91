//! Wire formatting of server replies.
//!
//! A reply is a status code followed by optional text. Multi-line text is
//! emitted with the `<code>-` continuation prefix on every line but the last,
//! which uses `<code> `, so clients know where the reply ends.

use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use crate::status::Status;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub text: Option<Cow<'static, str>>,
}

impl Reply {
    pub fn new(status: Status, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            text: Some(text.into()),
        }
    }

    /// A reply consisting of the status code alone, e.g. the bare `334` prompt.
    pub const fn bare(status: Status) -> Self {
        Self { status, text: None }
    }

    pub fn ok() -> Self {
        Self::new(Status::Ok, "Ok")
    }

    pub fn bad_sequence() -> Self {
        Self::new(Status::InvalidCommandSequence, "Bad sequence of commands")
    }

    pub fn not_implemented() -> Self {
        Self::new(Status::NotImplemented, "Command not implemented")
    }

    pub fn syntax(text: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Status::InvalidArguments, text)
    }

    /// Encode this reply into the bytes written on the wire.
    pub fn encode(&self) -> Vec<u8> {
        encode(u32::from(self.status), self.text.as_deref())
    }
}

impl Display for Reply {
    /// Renders the reply without the trailing CRLF, one line per wire line.
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let encoded = self.encode();
        let text = String::from_utf8_lossy(&encoded);
        fmt.write_str(text.trim_end_matches("\r\n"))
    }
}

/// Format `code` and `text` using the reply continuation convention.
///
/// Internal line breaks may be either `\n` or `\r\n`.
pub fn encode(code: u32, text: Option<&str>) -> Vec<u8> {
    let Some(text) = text else {
        return format!("{code}\r\n").into_bytes();
    };

    let lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>();
    let last = lines.len() - 1;

    lines
        .iter()
        .enumerate()
        .fold(Vec::with_capacity(text.len() + 8), |mut out, (idx, line)| {
            let separator = if idx == last { ' ' } else { '-' };
            out.extend_from_slice(format!("{code}{separator}{line}\r\n").as_bytes());
            out
        })
}
