use super::{RconPacket, MAX_OUTGOING_SIZE};
use crate::driver::{Driver, DEFAULT_TIMEOUT};
use crate::errors::{ProtocolError, RconError};
use crate::socket;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Frames RCON packets over a TCP connection.
///
/// Owns the socket for its lifetime. Reads are length-prefixed: four
/// little-endian bytes followed by exactly that many more, retried across
/// partial reads until satisfied or the peer closes the stream.
#[derive(Debug)]
pub struct RconDriver {
    host: String,
    port: u16,
    socket: Option<TcpStream>,
    timeout: Option<Duration>,
}

impl RconDriver {
    /// Create a driver for the given host and port. No connection is made
    /// until [`start`](Driver::start).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Encode and write one packet, with control over the outgoing length
    /// check.
    ///
    /// # Errors
    /// Returns [`RconError::PayloadTooLong`] if `length_check` is on and
    /// the encoded frame is 1460 bytes or more, or a [`ProtocolError`] on
    /// socket failure.
    pub async fn send_checked(
        &mut self,
        packet: &RconPacket,
        length_check: bool,
    ) -> Result<(), RconError> {
        let bytes = packet.to_bytes();

        if length_check && bytes.len() >= MAX_OUTGOING_SIZE {
            return Err(RconError::PayloadTooLong(bytes.len()));
        }

        let socket = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        trace!(len = bytes.len(), "writing rcon packet");
        socket.write_all(&bytes).await.map_err(ProtocolError::from)?;

        Ok(())
    }

    async fn read_frame(&mut self) -> Result<RconPacket, RconError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let mut prefix = [0u8; 4];
        socket::read_exact(&mut *socket, &mut prefix, self.timeout).await?;

        let length = i32::from_le_bytes(prefix);
        if length < 0 {
            return Err(RconError::MalformedPacket("negative length prefix"));
        }

        let mut body = vec![0u8; length as usize];
        socket::read_exact(&mut *socket, &mut body, self.timeout).await?;

        trace!(len = length, "read rcon packet");
        RconPacket::from_bytes(Bytes::from(body))
    }
}

#[async_trait]
impl Driver for RconDriver {
    type Packet = RconPacket;
    type Error = RconError;

    async fn start(&mut self) -> Result<(), RconError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", self.host, self.port);
        let socket = socket::bounded(self.timeout, TcpStream::connect(address.as_str())).await?;

        debug!(%address, "rcon connection established");
        self.socket = Some(socket);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RconError> {
        if let Some(mut socket) = self.socket.take() {
            debug!("closing rcon connection");
            socket.shutdown().await.map_err(ProtocolError::from)?;
        }

        Ok(())
    }

    async fn send(&mut self, packet: &RconPacket) -> Result<(), RconError> {
        self.send_checked(packet, true).await
    }

    async fn read(&mut self) -> Result<RconPacket, RconError> {
        match self.read_frame().await {
            Err(RconError::Protocol(ProtocolError::ConnectionClosed)) => {
                // Remote is done writing; drop our half before surfacing.
                self.socket = None;
                Err(ProtocolError::ConnectionClosed.into())
            }
            result => result,
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}
