use crate::core::transport::{Transport, TransportKind};
use crate::domain::{
    config::{FlowControlConfig, ParityConfig, SerialConfig},
    error::{BridgeError, BridgeResult},
};
use crate::infrastructure::serial::discovery;
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Writes may block on flow control for a while; keep them bounded but
/// longer than a read window.
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Serial side of the bridge.
///
/// Holds two OS handles to the same device: the opened port is used only
/// for reading and its `try_clone` only for writing. All blocking calls
/// run on the blocking thread pool.
///
/// A blocking read keeps running when the future that started it is
/// dropped. Whatever it receives lands in `pending` and is returned by the
/// next `read`, so a caller's timeout never loses bytes.
pub struct SerialTransport {
    name: String,
    reader: PortSlot,
    writer: PortSlot,
    pending: Arc<Mutex<Vec<u8>>>,
    open: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Open the configured device; `auto` picks the first USB serial port.
    pub async fn open(config: &SerialConfig) -> BridgeResult<Self> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::open_blocking(&config))
            .await
            .map_err(|e| BridgeError::Io(std::io::Error::other(e)))?
    }

    fn open_blocking(config: &SerialConfig) -> BridgeResult<Self> {
        let device = discovery::resolve_device(&config.device)?;

        let data_bits = match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            _ => return Err(BridgeError::config(format!("Invalid data bits: {}", config.data_bits))),
        };

        let stop_bits = match config.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            _ => return Err(BridgeError::config(format!("Invalid stop bits: {}", config.stop_bits))),
        };

        let parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let flow_control = match config.flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        };

        let reader = serialport::new(&device, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(config.read_timeout())
            .open()?;

        let mut writer = reader.try_clone()?;
        writer.set_timeout(config.read_timeout().max(MIN_WRITE_TIMEOUT))?;

        info!(
            "Serial port {} opened at {} baud ({})",
            device,
            config.baud_rate,
            config.framing()
        );

        Ok(Self {
            name: device,
            reader: Arc::new(Mutex::new(Some(reader))),
            writer: Arc::new(Mutex::new(Some(writer))),
            pending: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Move buffered bytes into `buf`, oldest first.
    fn take_pending(&self, buf: &mut [u8]) -> BridgeResult<usize> {
        let mut pending = self.pending.lock().map_err(|_| poisoned(&self.name))?;
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.drain(..n);
        Ok(n)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}

fn poisoned(name: &str) -> BridgeError {
    BridgeError::Io(std::io::Error::other(format!("serial port {} lock poisoned", name)))
}

fn join_error(e: tokio::task::JoinError) -> BridgeError {
    BridgeError::Io(std::io::Error::other(e))
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn read(&self, buf: &mut [u8]) -> BridgeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = self.take_pending(buf)?;
        if n > 0 {
            return Ok(n);
        }

        let slot = Arc::clone(&self.reader);
        let pending = Arc::clone(&self.pending);
        let name = self.name.clone();
        let len = buf.len();

        tokio::task::spawn_blocking(move || -> BridgeResult<()> {
            let mut guard = slot.lock().map_err(|_| poisoned(&name))?;
            let port = guard.as_mut().ok_or(BridgeError::NotConnected)?;

            // An abandoned read finished while we waited for the port
            if !pending.lock().map_err(|_| poisoned(&name))?.is_empty() {
                return Ok(());
            }

            let mut chunk = vec![0u8; len];
            match port.read(&mut chunk) {
                Ok(n) => {
                    pending
                        .lock()
                        .map_err(|_| poisoned(&name))?
                        .extend_from_slice(&chunk[..n]);
                    Ok(())
                }
                // Nothing arrived within the read window
                Err(e) if matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::Interrupted) => Ok(()),
                Err(e) => Err(BridgeError::Io(e)),
            }
        })
        .await
        .map_err(join_error)??;

        self.take_pending(buf)
    }

    async fn write(&self, buf: &[u8]) -> BridgeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let slot = Arc::clone(&self.writer);
        let open = Arc::clone(&self.open);
        let name = self.name.clone();
        let data = buf.to_vec();

        tokio::task::spawn_blocking(move || -> BridgeResult<usize> {
            let mut guard = slot.lock().map_err(|_| poisoned(&name))?;
            let port = guard.as_mut().ok_or(BridgeError::NotConnected)?;

            loop {
                match port.write(&data) {
                    Ok(n) => return Ok(n),
                    Err(e) if matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::Interrupted) => {
                        if !open.load(Ordering::SeqCst) {
                            return Err(BridgeError::NotConnected);
                        }
                        debug!("Serial write to {} stalled, retrying", name);
                    }
                    Err(e) => return Err(BridgeError::Io(e)),
                }
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn close(&self) -> BridgeResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let reader = Arc::clone(&self.reader);
        let writer = Arc::clone(&self.writer);
        let pending = Arc::clone(&self.pending);

        // Taking a slot waits for any in-flight blocking call, which is
        // bounded by the port timeouts.
        tokio::task::spawn_blocking(move || {
            for slot in [reader, writer] {
                let port = match slot.lock() {
                    Ok(mut guard) => guard.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                drop(port);
            }
            match pending.lock() {
                Ok(mut buffered) => buffered.clear(),
                Err(poisoned) => poisoned.into_inner().clear(),
            }
        })
        .await
        .map_err(join_error)?;

        info!("Serial port {} closed", self.name);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
