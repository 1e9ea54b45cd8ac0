//! Blocking counterparts of the byte-level helpers in [`crate::socket`].
//!
//! Timeouts ride on the socket itself via `set_read_timeout`; expiry
//! shows up as `WouldBlock` or `TimedOut` depending on platform and is
//! normalized to [`ProtocolError::Timeout`].

use crate::errors::ProtocolError;
use crate::varint::{CONTINUE_BIT, SEGMENT_BITS};
use std::io::{self, ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub(crate) fn map_io(error: io::Error) -> ProtocolError {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => ProtocolError::Timeout,
        _ => ProtocolError::Io(error),
    }
}

/// Resolve and connect, honoring the timeout for the connect itself, and
/// install it as the socket's read timeout.
pub(crate) fn connect(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TcpStream, ProtocolError> {
    let address = (host, port)
        .to_socket_addrs()
        .map_err(ProtocolError::Io)?
        .next()
        .ok_or_else(|| {
            ProtocolError::Io(io::Error::new(
                ErrorKind::AddrNotAvailable,
                "hostname did not resolve",
            ))
        })?;

    let stream = match timeout {
        Some(duration) => TcpStream::connect_timeout(&address, duration).map_err(map_io)?,
        None => TcpStream::connect(address).map_err(map_io)?,
    };

    set_read_timeout(&stream, timeout);
    Ok(stream)
}

/// Install `timeout` as the stream's read timeout. A zero duration would
/// be rejected by the OS, so it is treated as "no timeout".
pub(crate) fn set_read_timeout(stream: &TcpStream, timeout: Option<Duration>) {
    let timeout = timeout.filter(|duration| !duration.is_zero());
    let _ = stream.set_read_timeout(timeout);
}

/// Fill `buf` from `reader`, retrying partial reads until satisfied.
pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    let mut filled = 0;

    while filled < buf.len() {
        let count = reader.read(&mut buf[filled..]).map_err(map_io)?;

        if count == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        filled += count;
    }

    Ok(())
}

/// Read a VarInt one byte at a time from `reader`. Same 10-byte cap as
/// the async [`crate::socket::read_varint`].
pub(crate) fn read_varint<R: Read>(reader: &mut R) -> Result<i64, ProtocolError> {
    let mut result: i64 = 0;
    let mut read: u32 = 0;

    loop {
        let mut byte = [0u8; 1];
        let count = reader.read(&mut byte).map_err(map_io)?;

        if count == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        result |= i64::from(byte[0] & SEGMENT_BITS) << (7 * read);
        read += 1;

        if byte[0] & CONTINUE_BIT == 0 {
            return Ok(result);
        }

        if read >= crate::socket::MAX_VARINT_STREAM_LEN {
            return Err(ProtocolError::InvalidVarInt);
        }
    }
}
