use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorldError {
    /// Caller supplied a malformed world id, coordinate, block id or setting.
    Validation(String),
    NotFound(String),
    /// Duplicate layer name or id.
    Conflict(String),
    /// The resource is held by another operation, such as a running storage migration.
    Busy(String),
    Migration(String),
    Io(String),
    Serde(String),
    Any(String),
}

impl WorldError {
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            WorldError::Validation(_) => false,
            WorldError::NotFound(_) => false,
            WorldError::Conflict(_) => false,
            WorldError::Busy(_) => true,
            WorldError::Migration(_) => false,
            WorldError::Io(_) => true,
            WorldError::Serde(_) => false,
            WorldError::Any(_) => false,
        }
    }

    pub(crate) fn status_code(&self) -> u16 {
        match self {
            WorldError::Validation(_) => 400,
            WorldError::NotFound(_) => 404,
            WorldError::Conflict(_) | WorldError::Busy(_) => 409,
            _ => 500,
        }
    }
}

impl Display for WorldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorldError::Validation(v) => write!(f, "Validation failed: {}", v),
            WorldError::NotFound(v) => write!(f, "Not found: {}", v),
            WorldError::Conflict(v) => write!(f, "Conflict: {}", v),
            WorldError::Busy(v) => write!(f, "Busy: {}", v),
            WorldError::Migration(v) => write!(f, "Migration failed: {}", v),
            WorldError::Io(v) => write!(f, "IO error: {}", v),
            WorldError::Serde(v) => write!(f, "Serialization error: {}", v),
            WorldError::Any(v) => write!(f, "{}", v),
        }
    }
}

impl Error for WorldError {}

impl From<String> for WorldError {
    fn from(s: String) -> Self {
        WorldError::Any(s)
    }
}

impl From<io::Error> for WorldError {
    fn from(error: io::Error) -> Self {
        WorldError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for WorldError {
    fn from(error: serde_json::Error) -> Self {
        WorldError::Serde(error.to_string())
    }
}

impl From<tokio::task::JoinError> for WorldError {
    fn from(error: tokio::task::JoinError) -> Self {
        WorldError::Any(format!("background task failed: {error}"))
    }
}
