//! Blocking Query driver and client.

use super::{socket, Driver};
use crate::driver::DEFAULT_TIMEOUT;
use crate::errors::{ProtocolError, QueryError};
use crate::format::{DefaultFormatter, FormatMode, Formatter, QUERY_CONTEXT};
use crate::query::{
    FullStats, QueryData, QueryPacket, QueryPacketType, DEFAULT_PORT, SESSION_MASK,
};
use std::collections::HashMap;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::debug;

/// Largest datagram we accept from a Query server.
const MAX_DATAGRAM: usize = 4096;

/// Blocking counterpart of [`crate::query::QueryDriver`].
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

impl Driver for QueryDriver {
    type Packet = QueryPacket;
    type Error = QueryError;

    fn start(&mut self) -> Result<(), QueryError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(ProtocolError::from)?;
        socket
            .connect((self.host.as_str(), self.port))
            .map_err(ProtocolError::from)?;

        let timeout = self.timeout.filter(|duration| !duration.is_zero());
        let _ = socket.set_read_timeout(timeout);

        debug!(host = %self.host, port = self.port, "query socket ready");
        self.socket = Some(socket);

        Ok(())
    }

    fn stop(&mut self) -> Result<(), QueryError> {
        self.socket = None;
        Ok(())
    }

    fn send(&mut self, packet: &QueryPacket) -> Result<(), QueryError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;

        socket
            .send(&packet.to_bytes())
            .map_err(ProtocolError::from)?;

        Ok(())
    }

    fn read(&mut self) -> Result<QueryPacket, QueryError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let length = socket.recv(&mut buffer).map_err(socket::map_io)?;
        buffer.truncate(length);

        QueryPacket::from_bytes(&buffer)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;

        if let Some(socket) = &self.socket {
            let timeout = timeout.filter(|duration| !duration.is_zero());
            let _ = socket.set_read_timeout(timeout);
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

/// Blocking counterpart of [`crate::query::QueryClient`].
///
/// Performs a fresh handshake before every stats request, since challenge
/// tokens rotate server-side roughly every 30 seconds.
pub struct QueryClient {
    driver: QueryDriver,
    request_id: i32,
    format_mode: FormatMode,
    formatter: Box<dyn Formatter>,
}

impl QueryClient {
    /// Create a client for the given host and port. The session ID is
    /// derived from the wall clock; see
    /// [`with_request_id`](QueryClient::with_request_id) to pick one.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_request_id(host, port, crate::gen_request_id())
    }

    /// Create a client with a caller-supplied session ID, fixed for the
    /// lifetime of the client.
    pub fn with_request_id(host: &str, port: u16, request_id: i32) -> Self {
        Self {
            driver: QueryDriver::new(host, port),
            request_id,
            format_mode: FormatMode::default(),
            formatter: Box::new(DefaultFormatter),
        }
    }

    /// Create a client on [`DEFAULT_PORT`].
    pub fn with_default_port(host: &str) -> Self {
        Self::new(host, DEFAULT_PORT)
    }

    /// Change the timeout for future reads. `None` waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.driver.set_timeout(timeout);
    }

    /// Change what happens to formatting codes in stats values.
    pub fn set_format_mode(&mut self, mode: FormatMode) {
        self.format_mode = mode;
    }

    /// Replace the formatting hook applied to stats values.
    pub fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }

    /// Get the socket ready. No-op if already started; called
    /// automatically by the other operations.
    ///
    /// # Errors
    /// Returns `Err` if the local socket could not be bound.
    pub fn start(&mut self) -> Result<(), QueryError> {
        self.driver.start()
    }

    /// Release the socket.
    ///
    /// # Errors
    /// Infallible for UDP; present for symmetry with the other clients.
    pub fn stop(&mut self) -> Result<(), QueryError> {
        self.driver.stop()
    }

    /// Whether [`start`](QueryClient::start) has been called.
    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Perform a handshake and return the challenge token.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or an unparseable response.
    pub fn get_challenge(&mut self) -> Result<i32, QueryError> {
        let response = self.raw_send(QueryPacketType::HandshakeRequest, -1)?;

        if response.packet_type != QueryPacketType::HandshakeResponse {
            return Err(QueryError::UnexpectedPacketType);
        }

        Ok(response.challenge_token)
    }

    /// Fetch basic statistics.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, a session ID mismatch, or an
    /// unparseable response.
    pub fn get_basic_stats(&mut self) -> Result<HashMap<String, String>, QueryError> {
        let challenge = self.get_challenge()?;
        let response = self.raw_send(QueryPacketType::BasicRequest, challenge)?;

        let QueryData::Basic(mut stats) = response.data else {
            return Err(QueryError::UnexpectedPacketType);
        };

        self.formatter
            .apply_stats(&mut stats, None, self.format_mode, QUERY_CONTEXT);

        Ok(stats)
    }

    /// Fetch full statistics, including the player list.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, a session ID mismatch, or an
    /// unparseable response.
    pub fn get_full_stats(&mut self) -> Result<FullStats, QueryError> {
        let challenge = self.get_challenge()?;
        let response = self.raw_send(QueryPacketType::FullRequest, challenge)?;

        let QueryData::Full {
            mut stats,
            mut players,
        } = response.data
        else {
            return Err(QueryError::UnexpectedPacketType);
        };

        self.formatter.apply_stats(
            &mut stats,
            Some(&mut players),
            self.format_mode,
            QUERY_CONTEXT,
        );

        Ok(FullStats { stats, players })
    }

    fn raw_send(
        &mut self,
        packet_type: QueryPacketType,
        challenge_token: i32,
    ) -> Result<QueryPacket, QueryError> {
        if !self.driver.is_connected() {
            self.driver.start()?;
        }

        let request = QueryPacket::request(packet_type, self.request_id, challenge_token);
        self.driver.send(&request)?;

        let response = self.driver.read()?;

        if response.request_id != self.request_id & SESSION_MASK {
            return Err(QueryError::SessionIdMismatch);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::QueryClient;
    use crate::format::FormatMode;
    use std::net::UdpSocket;

    #[test]
    fn test_get_basic_stats() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server_socket.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let mut buffer = [0u8; 64];

            let (_, peer) = server_socket.recv_from(&mut buffer).unwrap();
            assert_eq!(&buffer[..3], b"\xfe\xfd\x09");

            let mut reply = vec![0x09];
            reply.extend_from_slice(&buffer[3..7]);
            reply.extend_from_slice(b"7531\x00");
            server_socket.send_to(&reply, peer).unwrap();

            let (_, peer) = server_socket.recv_from(&mut buffer).unwrap();
            let token = i32::from_be_bytes([buffer[7], buffer[8], buffer[9], buffer[10]]);
            assert_eq!(token, 7531);

            let mut reply = vec![0x00];
            reply.extend_from_slice(&buffer[3..7]);
            reply.extend_from_slice(
                b"A Minecraft Server\x00SMP\x00world\x000\x0020\x00\xddc127.0.0.1\x00",
            );
            server_socket.send_to(&reply, peer).unwrap();
        });

        let mut client = QueryClient::new("127.0.0.1", port);
        client.set_format_mode(FormatMode::Raw);

        let stats = client.get_basic_stats().unwrap();
        assert_eq!(stats["motd"], "A Minecraft Server");
        assert_eq!(stats["hostport"], "25565");

        server.join().unwrap();
    }
}
