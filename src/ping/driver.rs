use super::PingPacket;
use crate::driver::{Driver, DEFAULT_TIMEOUT};
use crate::errors::{PingError, ProtocolError};
use crate::socket;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Frames Server List Ping packets over a TCP connection.
///
/// Every inbound packet is prefixed by a VarInt giving the byte length of
/// everything after the prefix; the prefix is decoded one byte at a time
/// off the stream, then exactly that many bytes are read.
#[derive(Debug)]
pub struct PingDriver {
    host: String,
    port: u16,
    socket: Option<TcpStream>,
    timeout: Option<Duration>,
}

impl PingDriver {
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

    async fn read_frame(&mut self) -> Result<PingPacket, PingError> {
        let timeout = self.timeout;
        let socket = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let length = socket::read_varint(&mut *socket, timeout).await?;
        if length < 0 {
            return Err(PingError::MalformedPacket("negative length prefix"));
        }

        let mut body = vec![0u8; length as usize];
        socket::read_exact(&mut *socket, &mut body, timeout).await?;

        trace!(len = length, "read ping packet");
        PingPacket::from_bytes(&body)
    }
}

#[async_trait]
impl Driver for PingDriver {
    type Packet = PingPacket;
    type Error = PingError;

    async fn start(&mut self) -> Result<(), PingError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", self.host, self.port);
        let socket = socket::bounded(self.timeout, TcpStream::connect(address.as_str())).await?;

        debug!(%address, "ping connection established");
        self.socket = Some(socket);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PingError> {
        if let Some(mut socket) = self.socket.take() {
            debug!("closing ping connection");
            socket.shutdown().await.map_err(ProtocolError::from)?;
        }

        Ok(())
    }

    async fn send(&mut self, packet: &PingPacket) -> Result<(), PingError> {
        let bytes = packet.to_bytes()?;

        let socket = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        trace!(len = bytes.len(), "writing ping packet");
        socket.write_all(&bytes).await.map_err(ProtocolError::from)?;

        Ok(())
    }

    async fn read(&mut self) -> Result<PingPacket, PingError> {
        match self.read_frame().await {
            Err(PingError::Protocol(ProtocolError::ConnectionClosed)) => {
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
