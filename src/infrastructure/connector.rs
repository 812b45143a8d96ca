use crate::core::transport::{Connector, Transport};
use crate::domain::{
    config::{NetworkConfig, SerialConfig},
    error::BridgeResult,
};
use crate::infrastructure::{serial::SerialTransport, tcp};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens the real serial device and a real TCP socket
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

#[async_trait]
impl Connector for SystemConnector {
    async fn open_serial(&self, config: &SerialConfig) -> BridgeResult<Arc<dyn Transport>> {
        Ok(Arc::new(SerialTransport::open(config).await?))
    }

    async fn connect_network(&self, config: &NetworkConfig) -> BridgeResult<Arc<dyn Transport>> {
        Ok(Arc::new(tcp::connect(config).await?))
    }
}
