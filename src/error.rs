//! Error types for the public interface of this crate.
//!
//! Internally everything is an `anyhow::Error` (see `Res`). At the public boundary errors are
//! wrapped in `Error`, which adds an `ErrorType` so that callers can tell a server rejection apart
//! from an offline condition or a broken local cache.

use std::fmt::{Debug, Display, Formatter};

pub(crate) type Res<T> = anyhow::Result<T>;
pub type Result<T> = std::result::Result<T, Error>;

/// The message used when the server rejects a request without saying why.
pub(crate) const DEFAULT_SERVER_MESSAGE: &str = "Something went wrong";

/// The message used when an operation cannot be served without the network.
pub(crate) const OFFLINE_MESSAGE: &str = "Offline: This action requires an internet connection.";

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The configuration or data directory is missing or invalid.
    Config,
    /// The local cache could not be read or written.
    Cache,
    /// The server answered with a non-success status. Never retried automatically.
    Server,
    /// The operation requires the network and the network is unreachable.
    Offline,
    /// A request failed in a way that is not a connectivity problem, e.g. a malformed response.
    Transport,
    /// A payload could not be converted to or from the record model.
    Payload,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Config => "config",
            ErrorType::Cache => "cache",
            ErrorType::Server => "server",
            ErrorType::Offline => "offline",
            ErrorType::Transport => "transport",
            ErrorType::Payload => "payload",
        };
        f.write_str(s)
    }
}

/// The public error type.
pub struct Error {
    error_type: ErrorType,
    status: Option<u16>,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            status: None,
            inner: inner.into(),
        }
    }

    /// A rejection from the server. `message` is the server's `error` field when it sent one.
    pub(crate) fn server(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_MESSAGE.to_string());
        Self {
            error_type: ErrorType::Server,
            status: Some(status),
            inner: anyhow::anyhow!(message),
        }
    }

    pub(crate) fn offline() -> Self {
        Self::new(ErrorType::Offline, anyhow::anyhow!(OFFLINE_MESSAGE))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// The HTTP status for `ErrorType::Server` errors.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_offline(&self) -> bool {
        self.error_type == ErrorType::Offline
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The alternate form prints the whole context chain.
        write!(f, "{:#}", self.inner)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error", self.error_type)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        write!(f, ": {:?}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Converts internal results into public results with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
