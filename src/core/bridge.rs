use crate::core::cancel::{CancelHandle, CancelSignal};
use crate::core::pump::{Direction, Pump, PumpCounters};
use crate::core::transport::Transport;
use crate::domain::{
    config::BridgeOptions,
    error::{BridgeError, BridgeResult},
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a bridge run ended
#[derive(Debug)]
pub enum BridgeOutcome {
    /// The caller asked the bridge to stop
    Cancelled,
    /// One direction failed; both pumps have stopped
    Fault {
        direction: Direction,
        error: BridgeError,
    },
}

/// Counters shared between the pumps and whoever reports on them
#[derive(Debug, Default)]
pub struct BridgeCounters {
    pub serial_to_network: Arc<PumpCounters>,
    pub network_to_serial: Arc<PumpCounters>,
    reconnects: AtomicU64,
}

/// Point-in-time copy of `BridgeCounters`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub serial_to_network_bytes: u64,
    pub serial_to_network_chunks: u64,
    pub network_to_serial_bytes: u64,
    pub network_to_serial_chunks: u64,
    pub reconnects: u64,
}

impl BridgeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            serial_to_network_bytes: self.serial_to_network.bytes(),
            serial_to_network_chunks: self.serial_to_network.chunks(),
            network_to_serial_bytes: self.network_to_serial.bytes(),
            network_to_serial_chunks: self.network_to_serial.chunks(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

fn flatten(joined: Result<BridgeResult<()>, tokio::task::JoinError>) -> BridgeResult<()> {
    joined.map_err(|e| BridgeError::Io(std::io::Error::other(e)))?
}

/// Relay between `serial` and `network` until `cancel` fires or either
/// direction fails. Both pump tasks have finished when this returns, so the
/// transports may be closed right away.
pub async fn run_bridge(
    serial: Arc<dyn Transport>,
    network: Arc<dyn Transport>,
    options: &BridgeOptions,
    counters: &BridgeCounters,
    mut cancel: CancelSignal,
) -> BridgeOutcome {
    let pumps = CancelHandle::new();

    let upstream = Pump {
        direction: Direction::SerialToNetwork,
        source: Arc::clone(&serial),
        sink: Arc::clone(&network),
        buffer_size: options.buffer_size,
        log_traffic: options.log_traffic,
        counters: Arc::clone(&counters.serial_to_network),
    };
    let downstream = Pump {
        direction: Direction::NetworkToSerial,
        source: network,
        sink: serial,
        buffer_size: options.buffer_size,
        log_traffic: options.log_traffic,
        counters: Arc::clone(&counters.network_to_serial),
    };

    let mut upstream_task: JoinHandle<BridgeResult<()>> = tokio::spawn(upstream.run(pumps.signal()));
    let mut downstream_task: JoinHandle<BridgeResult<()>> =
        tokio::spawn(downstream.run(pumps.signal()));

    let first = tokio::select! {
        _ = cancel.cancelled() => None,
        joined = &mut upstream_task => Some((Direction::SerialToNetwork, flatten(joined))),
        joined = &mut downstream_task => Some((Direction::NetworkToSerial, flatten(joined))),
    };

    // Stop whatever is still running and wait for it before returning.
    pumps.cancel();

    match first {
        None => {
            for (direction, joined) in [
                (Direction::SerialToNetwork, upstream_task.await),
                (Direction::NetworkToSerial, downstream_task.await),
            ] {
                if let Err(e) = flatten(joined) {
                    debug!("Pump {} ended with {} during shutdown", direction, e);
                }
            }
            BridgeOutcome::Cancelled
        }
        Some((direction, result)) => {
            let (other_direction, other) = match direction {
                Direction::SerialToNetwork => (Direction::NetworkToSerial, flatten(downstream_task.await)),
                Direction::NetworkToSerial => (Direction::SerialToNetwork, flatten(upstream_task.await)),
            };

            match (result, other) {
                (Err(error), other) => {
                    if let Err(e) = other {
                        debug!("Pump {} also failed: {}", other_direction, e);
                    }
                    warn!("Bridge fault in {}: {}", direction, error);
                    BridgeOutcome::Fault { direction, error }
                }
                (Ok(()), Err(error)) => {
                    warn!("Bridge fault in {}: {}", other_direction, error);
                    BridgeOutcome::Fault {
                        direction: other_direction,
                        error,
                    }
                }
                (Ok(()), Ok(())) => BridgeOutcome::Cancelled,
            }
        }
    }
}
