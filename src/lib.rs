//! serbridge Library
//!
//! Relays raw bytes between a USB serial device and a TCP server. A
//! supervisor owns the connection, runs one pump per direction and tears
//! both transports down together on the first failure.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::bridge::{BridgeOutcome, BridgeStats};
pub use crate::core::supervisor::{ConnectionStatus, Supervisor};
pub use crate::core::transport::{Connector, Transport, TransportKind};
pub use domain::config::{AppConfig, BridgeConfig, NetworkConfig, ReconnectPolicy, SerialConfig};
pub use domain::error::{BridgeError, BridgeResult, ErrorKind};
pub use infrastructure::connector::SystemConnector;
