use crate::core::transport::{Transport, TransportKind};
use crate::domain::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Transport over any async read half / write half pair.
///
/// Each half sits behind its own lock, so a reader task and a writer task
/// never contend with each other.
pub struct StreamTransport<R, W> {
    kind: TransportKind,
    name: String,
    reader: Mutex<Option<R>>,
    writer: Mutex<Option<W>>,
    open: AtomicBool,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(kind: TransportKind, name: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            kind,
            name: name.into(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        }
    }
}

impl<R, W> fmt::Debug for StreamTransport<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn read(&self, buf: &mut [u8]) -> BridgeResult<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(BridgeError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        match reader.read(buf).await? {
            0 => Err(BridgeError::closed_by_peer(&self.name)),
            n => Ok(n),
        }
    }

    async fn write(&self, buf: &[u8]) -> BridgeResult<usize> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(BridgeError::NotConnected)?;

        let n = writer.write(buf).await?;
        writer.flush().await?;
        Ok(n)
    }

    async fn close(&self) -> BridgeResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(mut writer) = self.writer.lock().await.take() {
            match writer.shutdown().await {
                Ok(()) => {}
                // The peer already went away, nothing left to shut down.
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                    debug!("{} already disconnected", self.name);
                }
                Err(e) => result = Err(BridgeError::Io(e)),
            }
        }
        self.reader.lock().await.take();

        info!("{} transport '{}' closed", self.kind, self.name);
        result
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
