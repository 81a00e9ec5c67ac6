//! Error types for bazar-core

use thiserror::Error;

/// Result type alias using bazar-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bazar-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No signed-in viewer; callers send the user to the sign-in entry point
    #[error("You need to sign in first")]
    Unauthenticated,

    /// Viewer tried to open a conversation about their own listing
    #[error("You cannot send messages to yourself")]
    SelfContact,

    /// Input refused locally before any network call
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Hosted backend rejected or failed a request
    #[error("Backend error: {0}")]
    Backend(String),

    /// Realtime channel failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Image upload failure
    #[error("Media upload error: {0}")]
    Media(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of failures, used by front ends to decide how a
/// failed user action is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Redirect to the sign-in entry point; nothing was mutated.
    Unauthenticated,
    /// Refused locally with a message; no network call was issued.
    Validation,
    /// Network or server failure on a read or write.
    Backend,
    /// Realtime channel failure, shown only as a status indicator.
    Channel,
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::SelfContact | Self::Validation(_) => ErrorKind::Validation,
            Self::Realtime(_) => ErrorKind::Channel,
            Self::NotFound(_)
            | Self::Backend(_)
            | Self::Media(_)
            | Self::LibSql(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Backend,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
