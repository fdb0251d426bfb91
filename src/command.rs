use core::fmt::{self, Display, Formatter};

/// The verb of a command line, matched case-insensitively.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Verb {
    Helo,
    Ehlo,
    StartTls,
    Mail,
    Rcpt,
    Data,
    Auth,
    Rset,
    Noop,
    Quit,
    Unknown,
}

impl Verb {
    /// Verbs that may be issued before the client has introduced itself.
    pub const fn allowed_before_greeting(self) -> bool {
        matches!(self, Self::Helo | Self::Ehlo | Self::Quit)
    }
}

impl From<&str> for Verb {
    fn from(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Self::Helo,
            "EHLO" => Self::Ehlo,
            "STARTTLS" => Self::StartTls,
            "MAIL" => Self::Mail,
            "RCPT" => Self::Rcpt,
            "DATA" => Self::Data,
            "AUTH" => Self::Auth,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => Self::Unknown,
        }
    }
}

impl Display for Verb {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Auth => "AUTH",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
            Self::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Helo(HeloVariant),
    StartTls,
    /// The sender, and the message size the client declared via `SIZE=`.
    MailFrom {
        sender: String,
        size: Option<usize>,
    },
    RcptTo(String),
    Data,
    Auth {
        mechanism: String,
        initial_response: Option<String>,
    },
    Rset,
    Noop,
    Quit,
    Unknown(String),
    /// A known verb with malformed arguments.
    Invalid {
        verb: Verb,
        reason: String,
    },
}

impl Command {
    pub const fn verb(&self) -> Verb {
        match self {
            Self::Helo(HeloVariant::Helo(_)) => Verb::Helo,
            Self::Helo(HeloVariant::Ehlo(_)) => Verb::Ehlo,
            Self::StartTls => Verb::StartTls,
            Self::MailFrom { .. } => Verb::Mail,
            Self::RcptTo(_) => Verb::Rcpt,
            Self::Data => Verb::Data,
            Self::Auth { .. } => Verb::Auth,
            Self::Rset => Verb::Rset,
            Self::Noop => Verb::Noop,
            Self::Quit => Verb::Quit,
            Self::Unknown(_) => Verb::Unknown,
            Self::Invalid { verb, .. } => *verb,
        }
    }

    fn invalid(verb: Verb, reason: impl Into<String>) -> Self {
        Self::Invalid {
            verb,
            reason: reason.into(),
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(HeloVariant::Ehlo(id) | HeloVariant::Helo(id)) => {
                write!(fmt, "{} {id}", self.verb())
            }
            Self::MailFrom {
                sender,
                size: Some(size),
            } => write!(fmt, "MAIL FROM:<{sender}> SIZE={size}"),
            Self::MailFrom { sender, size: None } => write!(fmt, "MAIL FROM:<{sender}>"),
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            // Never echo credentials into logs
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => write!(fmt, "AUTH {mechanism} <redacted>"),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => write!(fmt, "AUTH {mechanism}"),
            Self::Unknown(line) => fmt.write_str(line),
            Self::Invalid { verb, reason } => write!(fmt, "{verb} ({reason})"),
            _ => write!(fmt, "{}", self.verb()),
        }
    }
}

/// Extract the address from `<prefix><address>`, returning it and whatever follows.
///
/// Purely lexical: the prefix is matched case-insensitively, whitespace is
/// tolerated before the opening bracket and nothing about the address itself
/// is validated.
fn bracketed<'a>(args: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let head = args.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let rest = args[prefix.len()..].trim_start().strip_prefix('<')?;
    let end = rest.find('>')?;

    Some((&rest[..end], &rest[end + 1..]))
}

fn parse_mail_from(args: &str) -> Result<Command, Command> {
    let (sender, params) = bracketed(args, "FROM:")
        .ok_or_else(|| Command::invalid(Verb::Mail, "Expected FROM:<address>"))?;

    if sender.is_empty() {
        return Err(Command::invalid(Verb::Mail, "Sender address is required"));
    }

    let mut size = None;
    for param in params.split_whitespace() {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        if key.eq_ignore_ascii_case("SIZE") {
            size = Some(value.parse::<usize>().map_err(|_| {
                Command::invalid(Verb::Mail, format!("Invalid SIZE value: {value}"))
            })?);
        }
    }

    Ok(Command::MailFrom {
        sender: sender.to_string(),
        size,
    })
}

fn parse_rcpt_to(args: &str) -> Result<Command, Command> {
    match bracketed(args, "TO:") {
        Some((recipient, _)) if !recipient.is_empty() => {
            Ok(Command::RcptTo(recipient.to_string()))
        }
        Some(_) => Err(Command::invalid(Verb::Rcpt, "Recipient address is required")),
        None => Err(Command::invalid(Verb::Rcpt, "Expected TO:<address>")),
    }
}

fn parse_auth(args: &str) -> Result<Command, Command> {
    let mut parts = args.split_whitespace();
    let mechanism = parts
        .next()
        .ok_or_else(|| Command::invalid(Verb::Auth, "Expected a mechanism"))?;

    Ok(Command::Auth {
        mechanism: mechanism.to_ascii_uppercase(),
        initial_response: parts.next().map(str::to_string),
    })
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let trimmed = line.trim();
        let (verb, args) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(verb, args)| (verb, args.trim()));

        match Verb::from(verb) {
            Verb::Helo | Verb::Ehlo if args.is_empty() => Err(Self::invalid(
                Verb::from(verb),
                format!("Expected hostname in {trimmed}"),
            )),
            Verb::Helo => Ok(Self::Helo(HeloVariant::Helo(args.to_string()))),
            Verb::Ehlo => Ok(Self::Helo(HeloVariant::Ehlo(args.to_string()))),
            Verb::StartTls if !args.is_empty() => {
                Err(Self::invalid(Verb::StartTls, "STARTTLS takes no arguments"))
            }
            Verb::StartTls => Ok(Self::StartTls),
            Verb::Mail => parse_mail_from(args),
            Verb::Rcpt => parse_rcpt_to(args),
            Verb::Data => Ok(Self::Data),
            Verb::Auth => parse_auth(args),
            Verb::Rset => Ok(Self::Rset),
            Verb::Noop => Ok(Self::Noop),
            Verb::Quit => Ok(Self::Quit),
            Verb::Unknown => Ok(Self::Unknown(trimmed.to_string())),
        }
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
