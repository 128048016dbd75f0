use std::error;
use std::fmt;

pub type LocalResult<T> = Result<T, LocalError>;

#[derive(Debug, Clone)]
pub enum LocalError {
    // Catch-all for internal server errors whose messages we may
    // want to log but do not want to leak to the client.
    Internal(String),

    Protocol(String),
}

impl error::Error for LocalError {}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Internal(ref m) => write!(f, "{m}"),
            Self::Protocol(ref e) => write!(f, "ProtocolError: {e}"),
        }
    }
}

impl From<String> for LocalError {
    fn from(msg: String) -> Self {
        LocalError::Internal(msg)
    }
}

impl From<&str> for LocalError {
    fn from(msg: &str) -> Self {
        LocalError::from(msg.to_string())
    }
}

impl From<z3950::Z39Error> for LocalError {
    fn from(err: z3950::Z39Error) -> Self {
        LocalError::Protocol(err.to_string())
    }
}

impl From<zcatalog::CatalogError> for LocalError {
    fn from(err: zcatalog::CatalogError) -> Self {
        LocalError::Internal(err.to_string())
    }
}
