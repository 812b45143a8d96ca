use async_trait::async_trait;
use serbridge::infrastructure::memory::{self, MemoryTransport};
use serbridge::infrastructure::tcp;
use serbridge::{
    BridgeConfig, BridgeResult, ConnectionStatus, Connector, ErrorKind, NetworkConfig, SerialConfig, Supervisor,
    Transport, TransportKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

/// Integration tests for the serial-to-TCP bridge
#[cfg(test)]
mod integration_tests {
    use super::*;

    /// In-memory serial device, real TCP socket
    #[derive(Default)]
    struct LoopbackConnector {
        devices: Mutex<Vec<DuplexStream>>,
        serials: Mutex<Vec<Arc<MemoryTransport>>>,
    }

    impl LoopbackConnector {
        fn device(&self) -> DuplexStream {
            self.devices.lock().unwrap().remove(0)
        }

        fn serial(&self) -> Arc<MemoryTransport> {
            Arc::clone(&self.serials.lock().unwrap()[0])
        }
    }

    #[async_trait]
    impl Connector for LoopbackConnector {
        async fn open_serial(&self, _config: &SerialConfig) -> BridgeResult<Arc<dyn Transport>> {
            let (transport, device) = memory::pair(TransportKind::Serial, "loopback-serial", 4096);
            let transport = Arc::new(transport);
            self.serials.lock().unwrap().push(Arc::clone(&transport));
            self.devices.lock().unwrap().push(device);
            Ok(transport)
        }

        async fn connect_network(&self, config: &NetworkConfig) -> BridgeResult<Arc<dyn Transport>> {
            Ok(Arc::new(tcp::connect(config).await?))
        }
    }

    fn config_for(port: u16) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = port;
        config.network.connect_timeout_ms = 1000;
        config
    }

    async fn start_bridge() -> (Arc<LoopbackConnector>, Supervisor, DuplexStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = Arc::new(LoopbackConnector::default());
        let supervisor = Supervisor::new(connector.clone());
        supervisor.connect(config_for(port)).await.unwrap();

        let (peer, _) = timeout(Duration::from_secs(2), listener.accept()).await.unwrap().unwrap();
        let device = connector.device();
        (connector, supervisor, device, peer)
    }

    async fn wait_for_error(rx: &mut watch::Receiver<ConnectionStatus>) -> ConnectionStatus {
        let status = timeout(Duration::from_secs(2), rx.wait_for(ConnectionStatus::is_error))
            .await
            .expect("no error status in time")
            .expect("supervisor dropped");
        (*status).clone()
    }

    #[tokio::test]
    async fn test_serial_bytes_reach_tcp_peer_in_order() {
        let (_connector, supervisor, mut device, mut peer) = start_bridge().await;

        device.write_all(&[0x01, 0x02, 0x03]).await.unwrap();
        let mut received = [0u8; 3];
        timeout(Duration::from_secs(2), peer.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, [0x01, 0x02, 0x03]);

        peer.write_all(b"ACK\r\n").await.unwrap();
        let mut reply = [0u8; 5];
        timeout(Duration::from_secs(2), device.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply, b"ACK\r\n");

        let stats = supervisor.stats().await;
        assert_eq!(stats.serial_to_network_bytes, 3);
        assert_eq!(stats.network_to_serial_bytes, 5);

        supervisor.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_peer_close_tears_down_both_sides() {
        let (connector, supervisor, _device, peer) = start_bridge().await;
        let mut rx = supervisor.subscribe();

        drop(peer);

        let status = wait_for_error(&mut rx).await;
        assert!(matches!(status, ConnectionStatus::Error { kind: ErrorKind::Io, .. }));
        assert!(!connector.serial().is_open());
        assert!(!supervisor.is_active().await);
    }

    #[tokio::test]
    async fn test_disconnect_while_bridging_closes_both_sides() {
        let (connector, supervisor, _device, mut peer) = start_bridge().await;

        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
        assert!(!connector.serial().is_open());

        // The peer sees the socket shut down
        let mut buf = [0u8; 8];
        let n = timeout(Duration::from_secs(2), peer.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        // Idempotent
        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_refused_connect_closes_serial() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let connector = Arc::new(LoopbackConnector::default());
        let supervisor = Supervisor::new(connector.clone());

        let err = supervisor.connect(config_for(port)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert!(!connector.serial().is_open());
        assert!(matches!(
            supervisor.status(),
            ConnectionStatus::Error {
                kind: ErrorKind::ConnectionRefused,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_second_connect_keeps_first_connection() {
        let (_connector, supervisor, mut device, mut peer) = start_bridge().await;

        let err = supervisor.connect(BridgeConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyConnected);

        device.write_all(b"still here").await.unwrap();
        let mut received = [0u8; 10];
        timeout(Duration::from_secs(2), peer.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&received, b"still here");

        supervisor.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_to_refusing_peer_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = Arc::new(LoopbackConnector::default());
        let supervisor = Supervisor::new(connector.clone());
        let mut rx = supervisor.subscribe();

        let mut config = config_for(port);
        config.reconnect.enabled = true;
        config.reconnect.max_attempts = 2;
        config.reconnect.initial_delay_ms = 5;
        config.reconnect.max_delay_ms = 10;
        supervisor.connect(config).await.unwrap();

        let (peer, _) = listener.accept().await.unwrap();
        drop(listener);
        drop(peer);

        let status = wait_for_error(&mut rx).await;
        assert!(matches!(
            status,
            ConnectionStatus::Error {
                kind: ErrorKind::ReconnectExhausted,
                ..
            }
        ));
        assert_eq!(supervisor.stats().await.reconnects, 0);

        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
    }
}
