use std::error;
use std::fmt;

pub type LocalResult<T> = Result<T, LocalError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalError {
    UnknownDatabase(String),
    UnknownTarget(String),
    /// The cached proxy search this id belongs to has been evicted.
    ExpiredSession,
    Unsupported(String),
    /// Backend (storage engine) failure, with its cause.
    Backend(String),
    /// A remote-target failure, already phrased for users.
    Remote(String),
}

impl error::Error for LocalError {}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UnknownDatabase(ref name) => write!(f, "unknown database: {name}"),
            Self::UnknownTarget(ref name) => write!(f, "unknown target: {name}"),
            Self::ExpiredSession => write!(f, "the search session has expired; search again"),
            Self::Unsupported(ref what) => write!(f, "unsupported operation: {what}"),
            Self::Backend(ref cause) => write!(f, "backend failure: {cause}"),
            Self::Remote(ref msg) => write!(f, "{msg}"),
        }
    }
}

impl From<String> for LocalError {
    fn from(msg: String) -> Self {
        LocalError::Backend(msg)
    }
}

impl From<&str> for LocalError {
    fn from(msg: &str) -> Self {
        LocalError::from(msg.to_string())
    }
}

impl From<rusqlite::Error> for LocalError {
    fn from(err: rusqlite::Error) -> Self {
        LocalError::Backend(err.to_string())
    }
}

impl From<postgres::Error> for LocalError {
    fn from(err: postgres::Error) -> Self {
        LocalError::Backend(err.to_string())
    }
}
