use serde::{Deserialize, Serialize};
use thiserror::Error;

/// serbridge unified error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A connection is already active: {0}")]
    AlreadyConnected(String),

    #[error("Transport not connected")]
    NotConnected,

    #[error("Reconnect failed after {attempts} attempts: {last}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        last: Box<BridgeError>,
    },

    #[error("Connection lost ({kind}): {message}")]
    ConnectionLost { kind: ErrorKind, message: String },

    #[error("Output error: {0}")]
    Output(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Copyable error category, carried by `ConnectionStatus::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    PermissionDenied,
    ConnectionRefused,
    Timeout,
    Io,
    Config,
    InvalidInput,
    AlreadyConnected,
    NotConnected,
    ReconnectExhausted,
    Output,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            BridgeError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            BridgeError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            BridgeError::Timeout(_) => ErrorKind::Timeout,
            BridgeError::Io(_) => ErrorKind::Io,
            BridgeError::Config { .. } => ErrorKind::Config,
            BridgeError::InvalidInput(_) => ErrorKind::InvalidInput,
            BridgeError::AlreadyConnected(_) => ErrorKind::AlreadyConnected,
            BridgeError::NotConnected => ErrorKind::NotConnected,
            BridgeError::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            BridgeError::ConnectionLost { kind, .. } => *kind,
            BridgeError::Output(_) => ErrorKind::Output,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Build an `Io` error for a peer that closed its end of the stream.
    pub fn closed_by_peer(what: &str) -> Self {
        BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} closed by peer", what),
        ))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DeviceUnavailable => "DeviceUnavailable",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::ConnectionRefused => "ConnectionRefused",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Io => "IOError",
            ErrorKind::Config => "Config",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::AlreadyConnected => "AlreadyConnected",
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::ReconnectExhausted => "ReconnectExhausted",
            ErrorKind::Output => "Output",
        };
        f.write_str(name)
    }
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => BridgeError::DeviceUnavailable(err.description),
            serialport::ErrorKind::InvalidInput => BridgeError::Config {
                message: err.description,
            },
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                BridgeError::DeviceUnavailable(err.description)
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                BridgeError::PermissionDenied(err.description)
            }
            serialport::ErrorKind::Io(kind) => {
                BridgeError::Io(std::io::Error::new(kind, err.description))
            }
            _ => {
                BridgeError::Io(std::io::Error::other(err.description))
            }
        }
    }
}
