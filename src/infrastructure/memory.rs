// In-memory transport backed by `tokio::io::duplex`
use crate::core::transport::TransportKind;
use crate::infrastructure::stream::StreamTransport;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

pub type MemoryTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Create a transport plus the raw stream of the far end.
///
/// Bytes written to the returned `DuplexStream` are read from the
/// transport and vice versa; dropping the stream looks like a peer
/// disconnect.
pub fn pair(kind: TransportKind, name: &str, capacity: usize) -> (MemoryTransport, DuplexStream) {
    let (local, remote) = tokio::io::duplex(capacity);
    let (reader, writer) = tokio::io::split(local);
    (StreamTransport::new(kind, name, reader, writer), remote)
}
