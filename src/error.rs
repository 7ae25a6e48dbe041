//! Error types for amiwire-client.

use thiserror::Error;

/// Main error type for all manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Opening the TCP socket failed.
    #[error("Connection refused by {addr}: {source}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server rejected the credentials. Carries the server's `Message`.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// No login acknowledgment arrived before the login timeout.
    #[error("No answer received for login request")]
    NoLoginResponse,

    /// Operation needs an open connection and there is none.
    #[error("No active connection")]
    NotConnected,

    /// Hook registered under a signal name that does not exist.
    #[error("Unsupported hook signal: {0}")]
    InvalidHookSignal(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration could not be read.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using ManagerError.
pub type Result<T> = std::result::Result<T, ManagerError>;
