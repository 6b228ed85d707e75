use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Remote,
    InvalidArgument,
    SendFailed,
    SerializeFailed,
    DeserializeFailed,
    SerdeJsonError,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub msg: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, msg: String) -> Self {
        Self { kind, msg }
    }

    #[must_use]
    pub fn kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            msg: String::default(),
        }
    }

    /// Wraps an error string received from a remote host.
    #[must_use]
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, msg.into())
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::kind(kind)
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(value: std::num::TryFromIntError) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            msg: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::SerdeJsonError,
            msg: value.to_string(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, self.msg.is_empty()) {
            (ErrorKind::Unknown(name), true) => write!(f, "{name}"),
            (ErrorKind::Unknown(name), false) => write!(f, "{name}: {}", self.msg),
            // timeout messages already start with the kind.
            (ErrorKind::Timeout, false) => f.write_str(&self.msg),
            (kind, true) => write!(f, "{kind:?}"),
            (kind, false) => write!(f, "{kind:?}: {}", self.msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
