use crate::core::cancel::CancelHandle;
use crate::core::pump::write_all;
use crate::core::transport::Transport;
use crate::domain::error::{BridgeError, BridgeResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default time to wait for the first response chunk
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Window in which stale input is discarded before a request goes out
pub const DRAIN_WINDOW: Duration = Duration::from_millis(10);

/// Crypto module version query: header, command 0x01, empty body, checksum.
pub const VERSION_REQUEST: [u8; 8] = [0xD4, 0x01, 0x00, 0x00, 0x00, 0x65, 0xE0, 0xD8];

/// Offset of the payload length byte in a module response
const LENGTH_OFFSET: usize = 4;

/// Discard whatever is already buffered on `transport`.
///
/// Reads until a window of `DRAIN_WINDOW` passes without data. Returns the
/// number of bytes thrown away.
pub async fn drain(transport: &dyn Transport, buffer: &mut [u8]) -> BridgeResult<usize> {
    let mut discarded = 0;
    loop {
        match tokio::time::timeout(DRAIN_WINDOW, transport.read(buffer)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => discarded += n,
            Ok(Err(e)) => return Err(e),
        }
    }

    if discarded > 0 {
        debug!("Drained {} stale bytes from {}", discarded, transport.describe());
    }
    Ok(discarded)
}

/// Send `request` and return the first chunk that comes back.
///
/// Stale input is drained first so the reply cannot be confused with
/// earlier traffic. Fails with `Timeout` when nothing arrives in time.
pub async fn request_response(
    transport: &dyn Transport,
    request: &[u8],
    timeout: Duration,
    buffer_size: usize,
) -> BridgeResult<Vec<u8>> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    drain(transport, &mut buffer).await?;

    // Nothing cancels a one-shot transaction; the handle only feeds write_all.
    let never = CancelHandle::new();
    write_all(transport, request, &mut never.signal()).await?;
    debug!("Request of {} bytes sent to {}", request.len(), transport.describe());

    let deadline = Instant::now() + timeout;
    loop {
        let read = tokio::time::timeout_at(deadline, transport.read(&mut buffer)).await;
        match read {
            Ok(Ok(0)) => continue,
            Ok(Ok(n)) => return Ok(buffer[..n].to_vec()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BridgeError::Timeout(format!(
                    "no response from {} within {}ms",
                    transport.describe(),
                    timeout.as_millis()
                )))
            }
        }
    }
}

/// Ask the crypto module for its version and return the version bytes.
///
/// The response carries the payload length at byte 4 and the payload right
/// after it. A reply split across reads is collected until that length is
/// reached or `timeout` runs out.
pub async fn query_version(transport: &dyn Transport, timeout: Duration, buffer_size: usize) -> BridgeResult<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut response = request_response(transport, &VERSION_REQUEST, timeout, buffer_size).await?;

    let mut buffer = vec![0u8; buffer_size.max(1)];
    while response.len() <= LENGTH_OFFSET || response.len() < payload_end(&response) {
        match tokio::time::timeout_at(deadline, transport.read(&mut buffer)).await {
            Ok(Ok(n)) => response.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    parse_version(&response)
}

fn payload_end(response: &[u8]) -> usize {
    LENGTH_OFFSET + 1 + usize::from(response[LENGTH_OFFSET])
}

fn parse_version(response: &[u8]) -> BridgeResult<Vec<u8>> {
    if response.len() <= LENGTH_OFFSET {
        return Err(BridgeError::InvalidInput(format!(
            "version response too short: {} bytes",
            response.len()
        )));
    }

    let length = usize::from(response[LENGTH_OFFSET]);
    if length == 0 {
        return Err(BridgeError::InvalidInput("version response is empty".to_string()));
    }

    let end = payload_end(response);
    if response.len() < end {
        return Err(BridgeError::InvalidInput(format!(
            "version response truncated: need {} bytes, got {}",
            end,
            response.len()
        )));
    }

    debug!("Module version {}", hex::encode_upper(&response[LENGTH_OFFSET + 1..end]));
    Ok(response[LENGTH_OFFSET + 1..end].to_vec())
}
