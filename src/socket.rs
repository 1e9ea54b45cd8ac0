//! Byte-level read helpers shared by the TCP drivers.
//!
//! Every read is bounded by the caller's timeout, and an empty read is
//! reported as [`ProtocolError::ConnectionClosed`] so drivers can shut the
//! socket down before surfacing the error.

use crate::errors::ProtocolError;
use crate::varint::{CONTINUE_BIT, SEGMENT_BITS};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Streaming varint reads cap out at 10 bytes rather than 5, accepting
/// VarLong-sized length prefixes off the wire.
pub(crate) const MAX_VARINT_STREAM_LEN: u32 = 10;

/// Await `fut`, bounding it by `dur` when one is set.
pub(crate) async fn bounded<F, T>(dur: Option<Duration>, fut: F) -> Result<T, ProtocolError>
where
    F: Future<Output = io::Result<T>>,
{
    match dur {
        None => fut.await.map_err(ProtocolError::from),
        Some(d) => timeout(d, fut)
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(ProtocolError::from),
    }
}

/// Fill `buf` from `reader`, retrying partial reads until satisfied.
pub(crate) async fn read_exact<R>(
    reader: &mut R,
    buf: &mut [u8],
    dur: Option<Duration>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut filled = 0;

    while filled < buf.len() {
        let count = bounded(dur, reader.read(&mut buf[filled..])).await?;

        if count == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        filled += count;
    }

    Ok(())
}

/// Read a VarInt one byte at a time from `reader`.
///
/// Used for length prefixes, which arrive before we know how much data to
/// expect. Fails with [`ProtocolError::InvalidVarInt`] if no terminating
/// byte arrives within [`MAX_VARINT_STREAM_LEN`] bytes.
pub(crate) async fn read_varint<R>(reader: &mut R, dur: Option<Duration>) -> Result<i64, ProtocolError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut result: i64 = 0;
    let mut read: u32 = 0;

    loop {
        let mut byte = [0u8; 1];
        let count = bounded(dur, reader.read(&mut byte)).await?;

        if count == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        result |= i64::from(byte[0] & SEGMENT_BITS) << (7 * read);
        read += 1;

        if byte[0] & CONTINUE_BIT == 0 {
            return Ok(result);
        }

        if read >= MAX_VARINT_STREAM_LEN {
            return Err(ProtocolError::InvalidVarInt);
        }
    }
}
