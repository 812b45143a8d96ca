use crate::domain::error::{BridgeError, ErrorKind};
use serde::Serialize;

/// Lifecycle state of the supervised connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No connection
    #[default]
    Idle,
    /// Opening the serial device and the network peer
    Connecting,
    /// Both pumps are relaying
    Bridging,
    /// Pumps stopped, transports being released
    Closing,
    /// Waiting for or performing reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    /// The last connection ended with a failure
    Error { kind: ErrorKind, message: String },
}

impl ConnectionStatus {
    pub fn from_error(error: &BridgeError) -> Self {
        ConnectionStatus::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionStatus::Error { .. })
    }

    /// True while a connection holds, or is trying to hold, both transports
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Bridging | ConnectionStatus::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Bridging => write!(f, "bridging"),
            ConnectionStatus::Closing => write!(f, "closing"),
            ConnectionStatus::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionStatus::Error { kind, message } => write!(f, "error [{}]: {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_error() {
        let status = ConnectionStatus::from_error(&BridgeError::ConnectionRefused("127.0.0.1:9".into()));
        assert!(status.is_error());
        assert!(!status.is_live());
        assert_eq!(
            status.to_string(),
            "error [ConnectionRefused]: Connection refused: 127.0.0.1:9"
        );
    }

    #[test]
    fn test_status_json_shape() {
        let json = serde_json::to_string(&ConnectionStatus::Reconnecting { attempt: 2 }).unwrap();
        assert_eq!(json, r#"{"state":"reconnecting","attempt":2}"#);

        let json = serde_json::to_string(&ConnectionStatus::Idle).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }
}
