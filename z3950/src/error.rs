use std::error;
use std::fmt;

pub type LocalResult<T> = Result<T, LocalError>;

/// Crate-local errors for the codec, protocol, and client layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalError {
    /// More bytes are required to complete the value being decoded.
    Truncated,
    /// The peer sent an indefinite-form length, which this codec does
    /// not support.
    IndefiniteLength,
    MalformedTag,
    MalformedLength,
    /// A required PDU field was absent.  Carries the field name.
    MissingField(&'static str),
    /// The conversation violated the protocol in some other way.
    Protocol(String),
    /// An RPN structure node carried an unknown choice tag.
    ExpectedOperand,
    /// An RPN operand had no search term.
    MissingTerm,
    /// The server answered the InitializeRequest with Result=false.
    InitRejected,
    /// The server sent an unsolicited Close with this reason code.
    ServerClosed(i64),
    Network(String),
}

impl error::Error for LocalError {}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Truncated => write!(f, "truncated BER value"),
            Self::IndefiniteLength => write!(f, "indefinite lengths are not supported"),
            Self::MalformedTag => write!(f, "malformed BER tag"),
            Self::MalformedLength => write!(f, "malformed BER length"),
            Self::MissingField(name) => write!(f, "missing required field: {name}"),
            Self::Protocol(ref e) => write!(f, "protocol error: {e}"),
            Self::ExpectedOperand => write!(f, "expected an RPN operand"),
            Self::MissingTerm => write!(f, "RPN operand has no term"),
            Self::InitRejected => write!(f, "server rejected the initialize request"),
            Self::ServerClosed(reason) => write!(f, "server closed the session (reason={reason})"),
            Self::Network(ref e) => write!(f, "network error: {e}"),
        }
    }
}

impl From<String> for LocalError {
    fn from(msg: String) -> Self {
        LocalError::Protocol(msg)
    }
}

impl From<&str> for LocalError {
    fn from(msg: &str) -> Self {
        LocalError::from(msg.to_string())
    }
}

impl From<std::io::Error> for LocalError {
    fn from(err: std::io::Error) -> Self {
        LocalError::Network(err.to_string())
    }
}
