use super::QueryPacket;
use crate::driver::{Driver, DEFAULT_TIMEOUT};
use crate::errors::{ProtocolError, QueryError};
use crate::socket;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Largest datagram we accept from a Query server. Full stats with a long
/// player list can run well past the historical 1024-byte buffer.
const MAX_DATAGRAM: usize = 4096;

/// Exchanges Query packets over UDP.
///
/// Query is connectionless: `start` binds a local socket and fixes the
/// peer address, but nothing goes over the wire until the first request.
/// Responses are never fragmented across datagrams, so reads are a single
/// `recv`.
#[derive(Debug)]
pub struct QueryDriver {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    timeout: Option<Duration>,
}

impl QueryDriver {
    /// Create a driver for the given host and port. No socket exists
    /// until [`start`](Driver::start).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

#[async_trait]
impl Driver for QueryDriver {
    type Packet = QueryPacket;
    type Error = QueryError;

    async fn start(&mut self) -> Result<(), QueryError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(ProtocolError::from)?;

        let address = format!("{}:{}", self.host, self.port);
        socket
            .connect(address.as_str())
            .await
            .map_err(ProtocolError::from)?;

        debug!(%address, "query socket ready");
        self.socket = Some(socket);

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), QueryError> {
        self.socket = None;
        Ok(())
    }

    async fn send(&mut self, packet: &QueryPacket) -> Result<(), QueryError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let bytes = packet.to_bytes();
        trace!(len = bytes.len(), "writing query datagram");
        socket.send(&bytes).await.map_err(ProtocolError::from)?;

        Ok(())
    }

    async fn read(&mut self) -> Result<QueryPacket, QueryError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let length = socket::bounded(self.timeout, socket.recv(&mut buffer)).await?;
        buffer.truncate(length);

        trace!(len = length, "read query datagram");
        QueryPacket::from_bytes(&buffer)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}
