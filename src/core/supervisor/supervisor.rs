use crate::core::{
    bridge::{run_bridge, BridgeCounters, BridgeOutcome, BridgeStats},
    cancel::{CancelHandle, CancelSignal},
    supervisor::{backoff::retry_delay, state::ConnectionStatus},
    transport::{Connector, Transport},
};
use crate::domain::{
    config::BridgeConfig,
    error::{BridgeError, BridgeResult},
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type TransportPair = (Arc<dyn Transport>, Arc<dyn Transport>);

/// Owns at most one serial-to-network connection and drives its lifecycle.
pub struct Supervisor {
    /// Opens the transports
    connector: Arc<dyn Connector>,
    /// Current status, shared with the driver task
    status: Arc<watch::Sender<ConnectionStatus>>,
    /// The running connection, if any
    active: Mutex<Option<ActiveConnection>>,
    /// Aborts a `connect` that is still opening its transports
    opening: Mutex<Option<CancelHandle>>,
    /// Counters of the current or most recent connection
    counters: RwLock<Arc<BridgeCounters>>,
}

struct ActiveConnection {
    id: Uuid,
    cancel: CancelHandle,
    driver: JoinHandle<()>,
}

impl ActiveConnection {
    /// `Idle` and `Error` are the driver's final statuses.
    fn is_running(&self, status: &ConnectionStatus) -> bool {
        !self.driver.is_finished()
            && !matches!(status, ConnectionStatus::Idle | ConnectionStatus::Error { .. })
    }
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            connector,
            status: Arc::new(status),
            active: Mutex::new(None),
            opening: Mutex::new(None),
            counters: RwLock::new(Arc::new(BridgeCounters::new())),
        }
    }

    /// Open both transports and start relaying.
    ///
    /// Fails with `AlreadyConnected` while another connection is running;
    /// that connection is left untouched. When the network side cannot be
    /// opened the serial side is closed again before the error is returned.
    /// A `disconnect` issued while the transports are opening aborts the
    /// attempt, which then fails with `NotConnected` and leaves `Idle`.
    pub async fn connect(&self, config: BridgeConfig) -> BridgeResult<Uuid> {
        config.validate().map_err(BridgeError::config)?;

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if self.running(current) {
                return Err(BridgeError::AlreadyConnected(current.id.to_string()));
            }
        }
        if let Some(finished) = active.take() {
            reap(finished).await;
        }

        let abort = CancelHandle::new();
        let mut aborted = abort.signal();
        *self.opening.lock().await = Some(abort);

        self.status.send_replace(ConnectionStatus::Connecting);
        let opened = open_pair(self.connector.as_ref(), &config, &mut aborted).await;
        self.opening.lock().await.take();

        let (serial, network) = match opened {
            Ok(pair) => pair,
            Err(e) if aborted.is_cancelled() => {
                info!("Connect aborted by disconnect");
                self.status.send_replace(ConnectionStatus::Idle);
                return Err(e);
            }
            Err(e) => {
                error!("Connect failed: {}", e);
                self.status.send_replace(ConnectionStatus::from_error(&e));
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let counters = Arc::new(BridgeCounters::new());
        *self.counters.write().await = Arc::clone(&counters);

        info!(
            "Connection {} bridging {} <-> {}",
            id,
            serial.describe(),
            network.describe()
        );
        self.status.send_replace(ConnectionStatus::Bridging);

        let cancel = CancelHandle::new();
        let driver = Driver {
            id,
            connector: Arc::clone(&self.connector),
            config,
            status: Arc::clone(&self.status),
            counters,
        };
        let task = tokio::spawn(driver.run(serial, network, cancel.signal()));

        *active = Some(ActiveConnection {
            id,
            cancel,
            driver: task,
        });
        Ok(id)
    }

    /// Stop relaying, release both transports and return to `Idle`.
    ///
    /// Waits for the pumps to stop before the transports are closed. A
    /// `connect` still opening its transports is aborted first. Without an
    /// active connection this only clears an `Error` status.
    pub async fn disconnect(&self) -> BridgeResult<()> {
        if let Some(abort) = self.opening.lock().await.take() {
            info!("Aborting connect in progress");
            abort.cancel();
        }

        let mut active = self.active.lock().await;

        let Some(connection) = active.take() else {
            let failed = self.status.borrow().is_error();
            if failed {
                self.status.send_replace(ConnectionStatus::Idle);
            }
            return Ok(());
        };

        info!("Disconnecting connection {}", connection.id);
        connection.cancel.cancel();
        let joined = connection.driver.await;
        self.status.send_replace(ConnectionStatus::Idle);

        joined.map_err(|e| {
            error!("Connection {} driver failed: {}", connection.id, e);
            BridgeError::Io(std::io::Error::other(e))
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Relay counters of the current or most recent connection
    pub async fn stats(&self) -> BridgeStats {
        self.counters.read().await.snapshot()
    }

    pub async fn is_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|connection| self.running(connection))
    }

    pub async fn connection_id(&self) -> Option<Uuid> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|connection| self.running(connection))
            .map(|connection| connection.id)
    }

    fn running(&self, connection: &ActiveConnection) -> bool {
        let status = self.status.borrow().clone();
        connection.is_running(&status)
    }
}

async fn reap(finished: ActiveConnection) {
    if let Err(e) = finished.driver.await {
        warn!("Connection {} driver ended abnormally: {}", finished.id, e);
    }
}

/// Open serial first, then network; roll the serial side back on failure.
///
/// Gives up with `NotConnected` once `abort` fires.
async fn open_pair(
    connector: &dyn Connector,
    config: &BridgeConfig,
    abort: &mut CancelSignal,
) -> BridgeResult<TransportPair> {
    let serial = tokio::select! {
        biased;
        _ = abort.cancelled() => return Err(BridgeError::NotConnected),
        serial = connector.open_serial(&config.serial) => serial?,
    };

    let network = tokio::select! {
        biased;
        _ = abort.cancelled() => Err(BridgeError::NotConnected),
        network = connector.connect_network(&config.network) => network,
    };

    match network {
        Ok(network) => Ok((serial, network)),
        Err(e) => {
            debug!("Network connect failed, closing {}", serial.describe());
            if let Err(close_err) = serial.close().await {
                warn!("Closing {} after failed connect: {}", serial.describe(), close_err);
            }
            Err(e)
        }
    }
}

/// Close both transports; a failure on one side does not skip the other.
async fn close_pair(serial: &Arc<dyn Transport>, network: &Arc<dyn Transport>) {
    let (serial_closed, network_closed) = tokio::join!(serial.close(), network.close());
    if let Err(e) = serial_closed {
        warn!("Closing {} failed: {}", serial.describe(), e);
    }
    if let Err(e) = network_closed {
        warn!("Closing {} failed: {}", network.describe(), e);
    }
}

/// Background task that owns the transports of one connection.
struct Driver {
    id: Uuid,
    connector: Arc<dyn Connector>,
    config: BridgeConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    counters: Arc<BridgeCounters>,
}

impl Driver {
    async fn run(self, mut serial: Arc<dyn Transport>, mut network: Arc<dyn Transport>, mut cancel: CancelSignal) {
        loop {
            let outcome = run_bridge(
                Arc::clone(&serial),
                Arc::clone(&network),
                &self.config.options,
                &self.counters,
                cancel.clone(),
            )
            .await;

            self.status.send_replace(ConnectionStatus::Closing);
            close_pair(&serial, &network).await;

            let cause = match outcome {
                BridgeOutcome::Cancelled => {
                    info!("Connection {} closed", self.id);
                    self.status.send_replace(ConnectionStatus::Idle);
                    return;
                }
                BridgeOutcome::Fault { direction, error } => {
                    error!("Connection {} lost ({}): {}", self.id, direction, error);
                    error
                }
            };

            if !self.config.reconnect.enabled {
                self.status.send_replace(ConnectionStatus::from_error(&cause));
                return;
            }

            match self.reconnect(&mut cancel, cause).await {
                Ok(Some((new_serial, new_network))) => {
                    serial = new_serial;
                    network = new_network;
                    self.counters.record_reconnect();
                    info!("Connection {} re-established", self.id);
                    self.status.send_replace(ConnectionStatus::Bridging);
                }
                Ok(None) => {
                    info!("Connection {} reconnect cancelled", self.id);
                    self.status.send_replace(ConnectionStatus::Idle);
                    return;
                }
                Err(e) => {
                    error!("Connection {} gave up: {}", self.id, e);
                    self.status.send_replace(ConnectionStatus::from_error(&e));
                    return;
                }
            }
        }
    }

    /// Re-open both transports with exponential backoff.
    ///
    /// `Ok(None)` when cancelled while waiting.
    async fn reconnect(&self, cancel: &mut CancelSignal, cause: BridgeError) -> BridgeResult<Option<TransportPair>> {
        let policy = &self.config.reconnect;
        let mut last = cause;

        for attempt in 1..=policy.max_attempts {
            self.status.send_replace(ConnectionStatus::Reconnecting { attempt });
            let delay = retry_delay(attempt, policy);
            info!(
                "Connection {} reconnect attempt {}/{} in {}ms",
                self.id,
                attempt,
                policy.max_attempts,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }

            match open_pair(self.connector.as_ref(), &self.config, cancel).await {
                Ok((serial, network)) => {
                    if cancel.is_cancelled() {
                        close_pair(&serial, &network).await;
                        return Ok(None);
                    }
                    return Ok(Some((serial, network)));
                }
                Err(_) if cancel.is_cancelled() => return Ok(None),
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    last = e;
                }
            }
        }

        Err(BridgeError::ReconnectExhausted {
            attempts: policy.max_attempts,
            last: Box::new(last),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::TransportKind;
    use crate::domain::{
        config::{NetworkConfig, SerialConfig},
        error::ErrorKind,
    };
    use crate::infrastructure::memory::{self, MemoryTransport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Hands out in-memory transports and keeps the far ends for the test.
    #[derive(Default)]
    struct TestConnector {
        serial_ends: std::sync::Mutex<Vec<DuplexStream>>,
        network_ends: std::sync::Mutex<Vec<DuplexStream>>,
        serials: std::sync::Mutex<Vec<Arc<MemoryTransport>>>,
        refuse_network: AtomicBool,
        stall_network: AtomicBool,
        network_attempts: AtomicU32,
    }

    impl TestConnector {
        fn take_serial_end(&self) -> DuplexStream {
            self.serial_ends.lock().unwrap().remove(0)
        }

        fn take_network_end(&self) -> DuplexStream {
            self.network_ends.lock().unwrap().remove(0)
        }

        fn serial(&self, index: usize) -> Arc<MemoryTransport> {
            Arc::clone(&self.serials.lock().unwrap()[index])
        }
    }

    #[async_trait]
    impl Connector for TestConnector {
        async fn open_serial(&self, _config: &SerialConfig) -> BridgeResult<Arc<dyn Transport>> {
            let (transport, end) = memory::pair(TransportKind::Serial, "test-serial", 1024);
            let transport = Arc::new(transport);
            self.serials.lock().unwrap().push(Arc::clone(&transport));
            self.serial_ends.lock().unwrap().push(end);
            Ok(transport)
        }

        async fn connect_network(&self, config: &NetworkConfig) -> BridgeResult<Arc<dyn Transport>> {
            self.network_attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse_network.load(Ordering::SeqCst) {
                return Err(BridgeError::ConnectionRefused(config.address()));
            }
            if self.stall_network.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let (transport, end) = memory::pair(TransportKind::Network, "test-peer", 1024);
            self.network_ends.lock().unwrap().push(end);
            Ok(Arc::new(transport))
        }
    }

    fn fast_reconnect_config(max_attempts: u32) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.reconnect.enabled = true;
        config.reconnect.max_attempts = max_attempts;
        config.reconnect.initial_delay_ms = 1;
        config.reconnect.max_delay_ms = 4;
        config
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ConnectionStatus>,
        predicate: impl FnMut(&ConnectionStatus) -> bool,
    ) -> ConnectionStatus {
        let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("status transition timed out")
            .expect("supervisor dropped");
        (*status).clone()
    }

    #[tokio::test]
    async fn test_connect_relays_and_disconnects() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());

        supervisor.connect(BridgeConfig::default()).await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Bridging);
        assert!(supervisor.is_active().await);

        let mut device = connector.take_serial_end();
        let mut peer = connector.take_network_end();

        device.write_all(&[0x01, 0x02, 0x03]).await.unwrap();
        let mut received = [0u8; 3];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0x01, 0x02, 0x03]);

        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
        assert!(!supervisor.is_active().await);
        assert!(!connector.serial(0).is_open());
        assert_eq!(supervisor.stats().await.serial_to_network_bytes, 3);
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());

        let first = supervisor.connect(BridgeConfig::default()).await.unwrap();
        match supervisor.connect(BridgeConfig::default()).await {
            Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyConnected),
            Ok(_) => panic!("second connect must fail"),
        }

        assert_eq!(supervisor.connection_id().await, Some(first));
        assert_eq!(supervisor.status(), ConnectionStatus::Bridging);
        assert!(connector.serial(0).is_open());

        supervisor.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_network_rolls_back_serial() {
        let connector = Arc::new(TestConnector::default());
        connector.refuse_network.store(true, Ordering::SeqCst);
        let supervisor = Supervisor::new(connector.clone());

        let err = supervisor.connect(BridgeConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert!(!connector.serial(0).is_open());
        assert!(matches!(
            supervisor.status(),
            ConnectionStatus::Error {
                kind: ErrorKind::ConnectionRefused,
                ..
            }
        ));
        assert!(!supervisor.is_active().await);
    }

    #[tokio::test]
    async fn test_peer_loss_without_reconnect_reports_error() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());
        let mut rx = supervisor.subscribe();

        supervisor.connect(BridgeConfig::default()).await.unwrap();
        drop(connector.take_network_end());

        let status = wait_for(&mut rx, ConnectionStatus::is_error).await;
        assert!(matches!(status, ConnectionStatus::Error { kind: ErrorKind::Io, .. }));
        assert!(!connector.serial(0).is_open());
        assert!(!supervisor.is_active().await);

        // A new connect is allowed once the old one failed
        supervisor.connect(BridgeConfig::default()).await.unwrap();
        supervisor.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());
        let mut rx = supervisor.subscribe();

        supervisor.connect(fast_reconnect_config(3)).await.unwrap();
        connector.refuse_network.store(true, Ordering::SeqCst);
        drop(connector.take_network_end());

        let status = wait_for(&mut rx, ConnectionStatus::is_error).await;
        assert!(matches!(
            status,
            ConnectionStatus::Error {
                kind: ErrorKind::ReconnectExhausted,
                ..
            }
        ));
        // One initial connect plus three refused attempts
        assert_eq!(connector.network_attempts.load(Ordering::SeqCst), 4);
        for index in 0..4 {
            assert!(!connector.serial(index).is_open());
        }
    }

    #[tokio::test]
    async fn test_reconnect_restores_bridge() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());
        let mut rx = supervisor.subscribe();

        supervisor.connect(fast_reconnect_config(5)).await.unwrap();
        drop(connector.take_serial_end());
        drop(connector.take_network_end());

        tokio::time::timeout(Duration::from_secs(2), async {
            while supervisor.stats().await.reconnects == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reconnect timed out");
        wait_for(&mut rx, |s| *s == ConnectionStatus::Bridging).await;

        let mut device = connector.take_serial_end();
        let mut peer = connector.take_network_end();
        peer.write_all(b"again").await.unwrap();
        let mut received = [0u8; 5];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"again");

        assert_eq!(supervisor.stats().await.reconnects, 1);
        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_clears_error() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());

        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);

        connector.refuse_network.store(true, Ordering::SeqCst);
        assert!(supervisor.connect(BridgeConfig::default()).await.is_err());
        assert!(supervisor.status().is_error());

        supervisor.disconnect().await.unwrap();
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_opening() {
        let connector = Arc::new(TestConnector::default());
        let supervisor = Supervisor::new(connector.clone());

        let mut config = BridgeConfig::default();
        config.options.buffer_size = 0;

        let err = supervisor.connect(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(connector.serials.lock().unwrap().is_empty());
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_aborts_connect_in_progress() {
        let connector = Arc::new(TestConnector::default());
        connector.stall_network.store(true, Ordering::SeqCst);
        let supervisor = Arc::new(Supervisor::new(connector.clone()));
        let mut rx = supervisor.subscribe();

        let connecting = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.connect(BridgeConfig::default()).await })
        };
        wait_for(&mut rx, |status| *status == ConnectionStatus::Connecting).await;
        while connector.network_attempts.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_secs(2), supervisor.disconnect())
            .await
            .expect("disconnect blocked behind the open")
            .unwrap();

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(BridgeError::NotConnected)));
        assert_eq!(supervisor.status(), ConnectionStatus::Idle);
        assert!(!supervisor.is_active().await);
        assert!(!connector.serial(0).is_open());
    }
}
