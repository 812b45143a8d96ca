use crate::domain::{
    config::{NetworkConfig, SerialConfig},
    error::BridgeResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Serial,
    Network,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::Network => write!(f, "network"),
        }
    }
}

/// A byte-stream endpoint.
///
/// Reads and writes take `&self` so one task can read while another writes:
/// implementations keep the read side and the write side independent.
/// The bridge guarantees at most one concurrent reader and one concurrent
/// writer per transport.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Human readable endpoint name, e.g. `/dev/ttyUSB0` or `10.0.0.2:9000`
    fn describe(&self) -> String;

    /// Read up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means the read window elapsed without data; it is not EOF.
    /// A peer that closed the stream is reported as an error.
    async fn read(&self, buf: &mut [u8]) -> BridgeResult<usize>;

    /// Write some prefix of `buf`, returning how much was accepted.
    async fn write(&self, buf: &[u8]) -> BridgeResult<usize>;

    /// Release the endpoint. Calling it again is a no-op.
    async fn close(&self) -> BridgeResult<()>;

    fn is_open(&self) -> bool;
}

/// Opens the two sides of a connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open_serial(&self, config: &SerialConfig) -> BridgeResult<Arc<dyn Transport>>;

    async fn connect_network(&self, config: &NetworkConfig) -> BridgeResult<Arc<dyn Transport>>;
}
