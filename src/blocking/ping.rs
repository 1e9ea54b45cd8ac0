//! Blocking Server List Ping driver and client.

use super::{socket, Driver};
use crate::driver::DEFAULT_TIMEOUT;
use crate::errors::{PingError, ProtocolError};
use crate::format::{DefaultFormatter, FormatMode, Formatter, PING_CONTEXT};
use crate::ping::{PingPacket, StatusResponse, DEFAULT_PORT};
use serde_json::Value;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};
use tracing::debug;

/// Blocking counterpart of [`crate::ping::PingDriver`].
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

    fn read_frame(&mut self) -> Result<PingPacket, PingError> {
        let stream = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let length = socket::read_varint(&mut *stream)?;
        if length < 0 {
            return Err(PingError::MalformedPacket("negative length prefix"));
        }

        let mut body = vec![0u8; length as usize];
        socket::read_exact(&mut *stream, &mut body)?;

        PingPacket::from_bytes(&body)
    }
}

impl Driver for PingDriver {
    type Packet = PingPacket;
    type Error = PingError;

    fn start(&mut self) -> Result<(), PingError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let stream = socket::connect(&self.host, self.port, self.timeout)?;
        debug!(host = %self.host, port = self.port, "ping connection established");
        self.socket = Some(stream);

        Ok(())
    }

    fn stop(&mut self) -> Result<(), PingError> {
        if let Some(stream) = self.socket.take() {
            stream
                .shutdown(Shutdown::Both)
                .map_err(ProtocolError::from)?;
        }

        Ok(())
    }

    fn send(&mut self, packet: &PingPacket) -> Result<(), PingError> {
        let bytes = packet.to_bytes()?;

        let stream = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        stream.write_all(&bytes).map_err(ProtocolError::from)?;
        Ok(())
    }

    fn read(&mut self) -> Result<PingPacket, PingError> {
        match self.read_frame() {
            Err(PingError::Protocol(ProtocolError::ConnectionClosed)) => {
                self.socket = None;
                Err(ProtocolError::ConnectionClosed.into())
            }
            result => result,
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;

        if let Some(stream) = &self.socket {
            socket::set_read_timeout(stream, timeout);
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

/// Blocking counterpart of [`crate::ping::PingClient`].
///
/// Same strict handshake → status → ping sequencing; each operation is
/// single-use per connection and reconnects on the next call.
pub struct PingClient {
    driver: PingDriver,
    host: String,
    port: u16,
    protocol_version: i32,
    ping_number: u64,
    format_mode: FormatMode,
    formatter: Box<dyn Formatter>,
}

impl PingClient {
    /// Create a client for the given host and port, emulating the latest
    /// protocol version.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_protocol_version(host, port, 0)
    }

    /// Create a client on [`DEFAULT_PORT`].
    pub fn with_default_port(host: &str) -> Self {
        Self::new(host, DEFAULT_PORT)
    }

    /// Create a client that declares a specific protocol version in its
    /// handshake. Zero means "latest".
    pub fn with_protocol_version(host: &str, port: u16, protocol_version: i32) -> Self {
        Self {
            driver: PingDriver::new(host, port),
            host: host.to_owned(),
            port,
            protocol_version,
            ping_number: crate::gen_request_id() as u64,
            format_mode: FormatMode::default(),
            formatter: Box::new(DefaultFormatter),
        }
    }

    /// Change the timeout for future socket reads. `None` waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.driver.set_timeout(timeout);
    }

    /// Change what happens to formatting codes in the status tree.
    pub fn set_format_mode(&mut self, mode: FormatMode) {
        self.format_mode = mode;
    }

    /// Replace the formatting hook applied to the status tree.
    pub fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }

    /// Whether the underlying connection is open.
    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Close the connection early. The stats and ping operations already
    /// do this on success.
    ///
    /// # Errors
    /// Returns `Err` if the socket could not be shut down cleanly.
    pub fn stop(&mut self) -> Result<(), PingError> {
        self.driver.stop()
    }

    /// Fetch the status JSON, measure latency, merge the elapsed
    /// milliseconds under `time`, apply the session's formatting, and
    /// close the connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a response that is not the
    /// expected packet.
    pub fn get_stats(&mut self) -> Result<Value, PingError> {
        let mut data = self.fetch_status()?;
        let elapsed = self.send_ping()?;

        if let Some(map) = data.as_object_mut() {
            map.insert("time".to_owned(), elapsed.into());
        }

        self.formatter
            .apply_status(&mut data, self.format_mode, PING_CONTEXT);

        self.driver.stop()?;
        Ok(data)
    }

    /// Fetch the status JSON as a typed [`StatusResponse`], unformatted.
    /// Closes the connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, or
    /// [`PingError::MalformedPacket`] if the server's JSON is missing
    /// required fields.
    pub fn status(&mut self) -> Result<StatusResponse, PingError> {
        let data = self.fetch_status()?;

        let status = StatusResponse::from_value(data)
            .map_err(|_| PingError::MalformedPacket("unexpected status shape"))?;

        self.driver.stop()?;
        Ok(status)
    }

    /// Measure latency with a handshake and a ping/pong exchange only.
    /// Returns the elapsed milliseconds and closes the connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a response that is not a
    /// pong.
    pub fn ping(&mut self) -> Result<f64, PingError> {
        self.handshake()?;
        let elapsed = self.send_ping()?;

        self.driver.stop()?;
        Ok(elapsed)
    }

    fn handshake(&mut self) -> Result<(), PingError> {
        if !self.driver.is_connected() {
            self.driver.start()?;
        }

        let handshake = PingPacket::Handshake {
            protocol_version: self.protocol_version,
            hostname: self.host.clone(),
            port: self.port,
        };

        self.driver.send(&handshake)
    }

    fn fetch_status(&mut self) -> Result<Value, PingError> {
        self.handshake()?;

        self.driver.send(&PingPacket::StatusRequest)?;
        let response = self.driver.read()?;

        let PingPacket::StatusResponse { data } = response else {
            return Err(PingError::MalformedPacket("expected status response"));
        };

        Ok(data)
    }

    fn send_ping(&mut self) -> Result<f64, PingError> {
        let started = Instant::now();

        self.driver.send(&PingPacket::PingRequest {
            ping_number: self.ping_number,
        })?;

        let response = self.driver.read()?;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        if response != PingPacket::Pong {
            return Err(PingError::MalformedPacket("expected pong response"));
        }

        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::PingClient;
    use crate::format::FormatMode;
    use crate::varint::{decode_varint, encode_varint};
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut length = Vec::new();

        loop {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).unwrap();
            length.push(byte[0]);

            if byte[0] & 0x80 == 0 {
                break;
            }
        }

        let (length, _) = decode_varint(&length).unwrap();
        let mut body = vec![0u8; length as usize];
        stream.read_exact(&mut body).unwrap();

        body
    }

    fn write_frame(stream: &mut TcpStream, body: &[u8]) {
        stream.write_all(&encode_varint(body.len() as i32)).unwrap();
        stream.write_all(body).unwrap();
    }

    #[test]
    fn test_get_stats() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let status_json = r#"{"description":"hi","players":{"max":20,"online":0},"version":{"name":"1.8.8","protocol":47}}"#;

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let handshake = read_frame(&mut stream);
            assert_eq!(handshake[0], 0x00);

            let status_request = read_frame(&mut stream);
            assert_eq!(status_request, vec![0x00]);

            let mut response = vec![0x00u8];
            response.extend_from_slice(&encode_varint(status_json.len() as i32));
            response.extend_from_slice(status_json.as_bytes());
            write_frame(&mut stream, &response);

            let ping = read_frame(&mut stream);
            assert_eq!(ping[0], 0x01);
            write_frame(&mut stream, &ping);
        });

        let mut client = PingClient::new("127.0.0.1", port);
        client.set_format_mode(FormatMode::Raw);

        let stats = client.get_stats().unwrap();
        assert_eq!(stats["description"], json!("hi"));
        assert!(stats["time"].as_f64().is_some());
        assert!(!client.is_connected());

        server.join().unwrap();
    }
}
