//! Blocking RCON driver and client.

use super::{socket, Driver};
use crate::driver::DEFAULT_TIMEOUT;
use crate::errors::{ProtocolError, RconError};
use crate::format::{DefaultFormatter, FormatMode, Formatter};
use crate::rcon::{
    CommandOptions, RconPacket, RconPacketType, DEFAULT_PORT, FRAGMENT_TERMINATOR,
    MAX_OUTGOING_SIZE,
};
use bytes::Bytes;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use tracing::debug;

/// Blocking counterpart of [`crate::rcon::RconDriver`].
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
    /// the encoded frame is too large, or a [`ProtocolError`] on socket
    /// failure.
    pub fn send_checked(
        &mut self,
        packet: &RconPacket,
        length_check: bool,
    ) -> Result<(), RconError> {
        let bytes = packet.to_bytes();

        if length_check && bytes.len() >= MAX_OUTGOING_SIZE {
            return Err(RconError::PayloadTooLong(bytes.len()));
        }

        let stream = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        stream.write_all(&bytes).map_err(ProtocolError::from)?;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RconPacket, RconError> {
        let stream = self
            .socket
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;

        let mut prefix = [0u8; 4];
        socket::read_exact(&mut *stream, &mut prefix)?;

        let length = i32::from_le_bytes(prefix);
        if length < 0 {
            return Err(RconError::MalformedPacket("negative length prefix"));
        }

        let mut body = vec![0u8; length as usize];
        socket::read_exact(&mut *stream, &mut body)?;

        RconPacket::from_bytes(Bytes::from(body))
    }
}

impl Driver for RconDriver {
    type Packet = RconPacket;
    type Error = RconError;

    fn start(&mut self) -> Result<(), RconError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let stream = socket::connect(&self.host, self.port, self.timeout)?;
        debug!(host = %self.host, port = self.port, "rcon connection established");
        self.socket = Some(stream);

        Ok(())
    }

    fn stop(&mut self) -> Result<(), RconError> {
        if let Some(stream) = self.socket.take() {
            stream
                .shutdown(Shutdown::Both)
                .map_err(ProtocolError::from)?;
        }

        Ok(())
    }

    fn send(&mut self, packet: &RconPacket) -> Result<(), RconError> {
        self.send_checked(packet, true)
    }

    fn read(&mut self) -> Result<RconPacket, RconError> {
        match self.read_frame() {
            Err(RconError::Protocol(ProtocolError::ConnectionClosed)) => {
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

/// Blocking counterpart of [`crate::rcon::RconClient`].
///
/// Same session semantics; one operation in flight at a time, enforced by
/// `&mut self`.
pub struct RconClient {
    driver: RconDriver,
    request_id: i32,
    authenticated: bool,
    format_mode: FormatMode,
    formatter: Box<dyn Formatter>,
}

impl RconClient {
    /// Create a client for the given host and port. The request ID is
    /// derived from the wall clock; see
    /// [`with_request_id`](RconClient::with_request_id) to pick one.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_request_id(host, port, crate::gen_request_id())
    }

    /// Create a client with a caller-supplied request ID, fixed for the
    /// lifetime of the client.
    pub fn with_request_id(host: &str, port: u16, request_id: i32) -> Self {
        Self {
            driver: RconDriver::new(host, port),
            request_id,
            authenticated: false,
            format_mode: FormatMode::default(),
            formatter: Box::new(DefaultFormatter),
        }
    }

    /// Create a client on [`DEFAULT_PORT`].
    pub fn with_default_port(host: &str) -> Self {
        Self::new(host, DEFAULT_PORT)
    }

    /// Change the timeout for future socket reads. `None` waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.driver.set_timeout(timeout);
    }

    /// Change what happens to formatting codes in command output.
    pub fn set_format_mode(&mut self, mode: FormatMode) {
        self.format_mode = mode;
    }

    /// Replace the formatting hook applied to command output.
    pub fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }

    /// Open the connection. No-op if already connected; called
    /// automatically by the other operations.
    ///
    /// # Errors
    /// Returns `Err` on a network failure.
    pub fn start(&mut self) -> Result<(), RconError> {
        self.driver.start()
    }

    /// Close the connection and drop authentication state.
    ///
    /// # Errors
    /// Returns `Err` if the socket could not be shut down cleanly.
    pub fn stop(&mut self) -> Result<(), RconError> {
        self.authenticated = false;
        self.driver.stop()
    }

    /// Whether the underlying connection is open.
    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Whether a previous [`login`](RconClient::login) succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Authenticate with the server. Returns `true` on success, `false`
    /// if the password was rejected; already being authenticated is an
    /// immediate success.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a malformed response.
    pub fn login(&mut self, password: &str) -> Result<bool, RconError> {
        if self.authenticated {
            return Ok(true);
        }

        let response = self.raw_send(RconPacketType::Login, password, true, true)?;

        if response.request_id != self.request_id {
            debug!("rcon authentication rejected");
            return Ok(false);
        }

        self.authenticated = true;
        Ok(true)
    }

    /// Alias for [`login`](RconClient::login).
    ///
    /// # Errors
    /// Same as [`login`](RconClient::login).
    pub fn authenticate(&mut self, password: &str) -> Result<bool, RconError> {
        self.login(password)
    }

    /// Run a command on the server and return its output, with all checks
    /// enabled and the session's formatting applied.
    ///
    /// # Errors
    /// Same as [`command_with`](RconClient::command_with).
    pub fn command(&mut self, command: &str) -> Result<String, RconError> {
        self.command_with(command, CommandOptions::default())
    }

    /// Run a command with explicit [`CommandOptions`]. Fragmented
    /// responses are reassembled transparently when `frag_check` is on.
    ///
    /// # Errors
    /// Returns [`RconError::Authentication`] if `check_auth` is on and no
    /// login has succeeded (nothing is sent in that case), plus the
    /// driver's send and read errors.
    pub fn command_with(
        &mut self,
        command: &str,
        options: CommandOptions,
    ) -> Result<String, RconError> {
        if options.check_auth && !self.authenticated {
            return Err(RconError::Authentication);
        }

        let response = self.raw_send(
            RconPacketType::Command,
            command,
            options.frag_check,
            options.length_check,
        )?;

        Ok(self
            .formatter
            .apply(&response.payload, self.format_mode, command))
    }

    fn raw_send(
        &mut self,
        packet_type: RconPacketType,
        payload: &str,
        frag_check: bool,
        length_check: bool,
    ) -> Result<RconPacket, RconError> {
        if !self.driver.is_connected() {
            self.driver.start()?;
        }

        let request = RconPacket::new(self.request_id, packet_type, payload);
        self.driver.send_checked(&request, length_check)?;

        let mut response = self.driver.read()?;

        if response.request_id != self.request_id && packet_type != RconPacketType::Login {
            if self.authenticated {
                return Err(RconError::MalformedPacket("request id mismatch"));
            }

            return Err(RconError::Authentication);
        }

        if frag_check && response.is_fragmented() {
            debug!(
                wire_length = response.wire_length,
                "fragmented rcon response, reassembling"
            );

            let junk = RconPacket::new(self.request_id, RconPacketType::Response, "");
            self.driver.send_checked(&junk, false)?;

            loop {
                let fragment = self.driver.read()?;

                if fragment.request_type == i32::from(RconPacketType::Response)
                    && fragment.payload == FRAGMENT_TERMINATOR
                {
                    break;
                }

                if fragment.request_id != self.request_id {
                    return Err(RconError::MalformedPacket("request id mismatch"));
                }

                response.payload.push_str(&fragment.payload);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::RconClient;
    use crate::errors::RconError;
    use crate::format::FormatMode;
    use crate::rcon::{CommandOptions, RconPacket, RconPacketType};
    use bytes::Bytes;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn read_frame(stream: &mut TcpStream) -> RconPacket {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).unwrap();

        let mut body = vec![0u8; i32::from_le_bytes(prefix) as usize];
        stream.read_exact(&mut body).unwrap();

        RconPacket::from_bytes(Bytes::from(body)).unwrap()
    }

    fn write_packet(stream: &mut TcpStream, packet: &RconPacket) {
        stream.write_all(&packet.to_bytes()).unwrap();
    }

    #[test]
    fn test_login_and_command() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let login = read_frame(&mut stream);
            assert_eq!(login.request_type, i32::from(RconPacketType::Login));
            write_packet(
                &mut stream,
                &RconPacket::new(login.request_id, RconPacketType::Command, ""),
            );

            let command = read_frame(&mut stream);
            assert_eq!(command.payload, "seed");
            write_packet(
                &mut stream,
                &RconPacket::new(command.request_id, RconPacketType::Response, "Seed: [42]"),
            );
        });

        let mut client = RconClient::new("127.0.0.1", port);
        client.set_format_mode(FormatMode::Raw);

        assert!(client.login("secret").unwrap());
        assert_eq!(client.command("seed").unwrap(), "Seed: [42]");

        server.join().unwrap();
    }

    #[test]
    fn test_command_unauthenticated() {
        let mut client = RconClient::new("127.0.0.1", 25575);
        let result = client.command("list");

        assert!(matches!(result, Err(RconError::Authentication)));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_fragmented_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let chunk = "a".repeat(4200);
        let expected = format!("{chunk}end");

        let payload = chunk.clone();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let request = read_frame(&mut stream);
            let id = request.request_id;
            write_packet(
                &mut stream,
                &RconPacket::new(id, RconPacketType::Response, payload),
            );

            let junk = read_frame(&mut stream);
            assert!(junk.payload.is_empty());

            write_packet(&mut stream, &RconPacket::new(id, RconPacketType::Response, "end"));
            write_packet(
                &mut stream,
                &RconPacket::new(id, RconPacketType::Response, "Unknown request 0"),
            );
        });

        let mut client = RconClient::new("127.0.0.1", port);
        client.set_format_mode(FormatMode::Raw);

        let options = CommandOptions {
            check_auth: false,
            ..CommandOptions::default()
        };
        assert_eq!(client.command_with("data get", options).unwrap(), expected);

        server.join().unwrap();
    }
}
