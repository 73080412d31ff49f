//! Server error types.

use std::io;

use agendawall_providers::ProviderError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, listener, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Control protocol error (framing, encoding, timeout).
    #[error("Protocol error: {0}")]
    Protocol(#[from] agendawall_protocol::ProtocolError),

    /// Another daemon answers on the control socket.
    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory does not exist.
    #[error("Socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Fetching the timetable failed.
    #[error("Timetable fetch failed: {0}")]
    Provider(#[from] ProviderError),

    /// The hub or clock task has stopped.
    #[error("{component} is not running")]
    Unavailable { component: &'static str },
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    pub fn unavailable(component: &'static str) -> Self {
        Self::Unavailable { component }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_convert() {
        let err: ServerError = ProviderError::not_found("no event with id=1").into();
        assert!(matches!(err, ServerError::Provider(_)));
        assert!(err.to_string().contains("no event with id=1"));
    }

    #[test]
    fn unavailable_names_component() {
        assert_eq!(
            ServerError::unavailable("clock").to_string(),
            "clock is not running"
        );
    }
}
