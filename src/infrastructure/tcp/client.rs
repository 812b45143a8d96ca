use crate::core::transport::TransportKind;
use crate::domain::{
    config::NetworkConfig,
    error::{BridgeError, BridgeResult},
};
use crate::infrastructure::stream::StreamTransport;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, warn};

pub type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Connect to the configured peer within `connect_timeout_ms`.
pub async fn connect(config: &NetworkConfig) -> BridgeResult<TcpTransport> {
    let address = config.address();

    // Connect with timeout
    let stream = tokio::time::timeout(
        config.connect_timeout(),
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| {
        BridgeError::Timeout(format!(
            "connecting to {} took longer than {}ms",
            address, config.connect_timeout_ms
        ))
    })?
    .map_err(|e| map_connect_error(&address, e))?;

    // Configure socket options
    if config.no_delay {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
    }

    let name = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or(address);
    info!("TCP connection established to {}", name);

    let (reader, writer) = stream.into_split();
    Ok(StreamTransport::new(TransportKind::Network, name, reader, writer))
}

fn map_connect_error(address: &str, err: std::io::Error) -> BridgeError {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => BridgeError::ConnectionRefused(address.to_string()),
        std::io::ErrorKind::TimedOut => BridgeError::Timeout(format!("connecting to {}: {}", address, err)),
        std::io::ErrorKind::PermissionDenied => {
            BridgeError::PermissionDenied(format!("connecting to {}: {}", address, err))
        }
        _ => BridgeError::Io(std::io::Error::new(
            err.kind(),
            format!("failed to connect to {}: {}", address, err),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::Transport;
    use crate::domain::error::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn create_test_config(port: u16) -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 1000,
            no_delay: true,
        }
    }

    /// A port that had a listener a moment ago and now refuses connections
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = create_test_config(closed_port().await);

        let err = connect(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_transport_with_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _server_handle = tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0; 1024];
                if let Ok(n) = socket.read(&mut buf).await {
                    let _ = socket.write_all(&buf[0..n]).await;
                }
            }
        });

        let transport = connect(&create_test_config(addr.port())).await.unwrap();
        assert_eq!(transport.kind(), TransportKind::Network);
        assert_eq!(transport.describe(), addr.to_string());

        transport.write(&[0x01, 0x02, 0x03]).await.unwrap();
        let mut buf = [0u8; 8];
        let mut received = Vec::new();
        while received.len() < 3 {
            let n = transport.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, vec![0x01, 0x02, 0x03]);

        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // TEST-NET-1 (RFC 5737) is not routable; depending on the host this
        // either times out or fails immediately.
        let config = NetworkConfig {
            host: "192.0.2.1".to_string(),
            port: 12345,
            connect_timeout_ms: 100,
            no_delay: false,
        };

        let result = connect(&config).await;
        assert!(result.is_err());
    }
}
