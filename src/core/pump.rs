use crate::core::cancel::CancelSignal;
use crate::core::transport::Transport;
use crate::domain::error::{BridgeError, BridgeResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relay direction of one pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    SerialToNetwork,
    NetworkToSerial,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::SerialToNetwork => write!(f, "serial->network"),
            Direction::NetworkToSerial => write!(f, "network->serial"),
        }
    }
}

/// Byte and chunk counters of one direction
#[derive(Debug, Default)]
pub struct PumpCounters {
    bytes: AtomicU64,
    chunks: AtomicU64,
}

impl PumpCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, len: usize) {
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }
}

/// One directional relay loop
pub struct Pump {
    pub direction: Direction,
    pub source: Arc<dyn Transport>,
    pub sink: Arc<dyn Transport>,
    pub buffer_size: usize,
    pub log_traffic: bool,
    pub counters: Arc<PumpCounters>,
}

impl Pump {
    /// Relay until cancelled (`Ok`) or until a read or write fails (`Err`).
    pub async fn run(self, mut cancel: CancelSignal) -> BridgeResult<()> {
        let mut buffer = vec![0u8; self.buffer_size.max(1)];
        debug!(
            "Pump {} started ({} -> {})",
            self.direction,
            self.source.describe(),
            self.sink.describe()
        );

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Pump {} cancelled", self.direction);
                    return Ok(());
                }
                read = self.source.read(&mut buffer) => match read {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Pump {} read from {} failed: {}", self.direction, self.source.describe(), e);
                        return Err(e);
                    }
                },
            };

            if n == 0 {
                continue;
            }

            let chunk = &buffer[..n];
            if self.log_traffic {
                debug!("{} [{}] {}", self.direction, n, hex::encode_upper(chunk));
            }

            if !write_all(self.sink.as_ref(), chunk, &mut cancel).await? {
                info!("Pump {} cancelled mid-write", self.direction);
                return Ok(());
            }
            self.counters.record(n);
        }
    }
}

/// Write every byte of `data`, retrying partial writes.
///
/// Returns `Ok(false)` when cancellation arrived before the chunk was fully
/// written.
pub async fn write_all(
    sink: &dyn Transport,
    mut data: &[u8],
    cancel: &mut CancelSignal,
) -> BridgeResult<bool> {
    while !data.is_empty() {
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            written = sink.write(data) => written?,
        };

        if written == 0 {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("{} accepted zero bytes", sink.describe()),
            )));
        }
        data = &data[written..];
    }
    Ok(true)
}
