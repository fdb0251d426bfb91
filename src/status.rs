use core::fmt::{self, Display, Formatter};

#[repr(C, u32)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady = 220,
    GoodBye = 221,
    AuthSucceeded = 235,
    Ok = 250,
    AuthContinue = 334,
    StartMailInput = 354,
    SyntaxError = 500,
    InvalidArguments = 501,
    NotImplemented = 502,
    InvalidCommandSequence = 503,
    UnrecognisedMechanism = 504,
    InvalidCredentials = 535,
    ExceededStorage = 552,
    Unknown(u32),
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            235 => Self::AuthSucceeded,
            250 => Self::Ok,
            334 => Self::AuthContinue,
            354 => Self::StartMailInput,
            500 => Self::SyntaxError,
            501 => Self::InvalidArguments,
            502 => Self::NotImplemented,
            503 => Self::InvalidCommandSequence,
            504 => Self::UnrecognisedMechanism,
            535 => Self::InvalidCredentials,
            552 => Self::ExceededStorage,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSucceeded => 235,
            Status::Ok => 250,
            Status::AuthContinue => 334,
            Status::StartMailInput => 354,
            Status::SyntaxError => 500,
            Status::InvalidArguments => 501,
            Status::NotImplemented => 502,
            Status::InvalidCommandSequence => 503,
            Status::UnrecognisedMechanism => 504,
            Status::InvalidCredentials => 535,
            Status::ExceededStorage => 552,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status() {
        assert_eq!(Status::from(503), Status::InvalidCommandSequence);
        assert_eq!(u32::from(Status::InvalidCommandSequence), 503);
        assert_eq!(Status::from(421), Status::Unknown(421));
        assert_eq!(Status::Unknown(421).to_string(), "421");
    }
}
