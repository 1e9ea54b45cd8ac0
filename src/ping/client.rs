use super::{PingDriver, PingPacket, StatusResponse, DEFAULT_PORT};
use crate::driver::Driver;
use crate::errors::PingError;
use crate::format::{DefaultFormatter, FormatMode, Formatter, PING_CONTEXT};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Client for the Server List Ping protocol.
///
/// The protocol is strictly sequenced: a handshake (which gets no
/// response) must come first, a status request may follow, and a ping
/// request ends the conversation. Servers close the connection after
/// answering, so [`get_stats`](PingClient::get_stats),
/// [`status`](PingClient::status) and [`ping`](PingClient::ping) are each
/// single-use; the next call reconnects.
///
/// # Examples
///
/// ```no_run
/// use mc_client::ping::PingClient;
/// use mc_client::errors::PingError;
///
/// #[tokio::main]
/// async fn main() -> Result<(), PingError> {
///     let mut client = PingClient::new("mc.hypixel.net", 25565);
///
///     let stats = client.get_stats().await?;
///     println!("{stats:#?}");
///
///     Ok(())
/// }
/// ```
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
    ///
    /// Use [`DEFAULT_PORT`] unless the server is configured otherwise.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_protocol_version(host, port, 0)
    }

    /// Create a client on [`DEFAULT_PORT`].
    pub fn with_default_port(host: &str) -> Self {
        Self::new(host, DEFAULT_PORT)
    }

    /// Create a client that declares a specific
    /// [protocol version](https://wiki.vg/Protocol_version_numbers) in
    /// its handshake. Zero means "latest".
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

    /// Close the connection. The stats and ping operations already do
    /// this on success; this is for bailing out early.
    ///
    /// # Errors
    /// Returns `Err` if the socket could not be shut down cleanly.
    pub async fn stop(&mut self) -> Result<(), PingError> {
        self.driver.stop().await
    }

    /// Fetch the status JSON, measure latency, and return the combined
    /// tree: the elapsed milliseconds are merged under the `time` key and
    /// the session's formatting is applied. Closes the connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a response that is not the
    /// expected packet.
    pub async fn get_stats(&mut self) -> Result<Value, PingError> {
        let mut data = self.fetch_status().await?;

        // Ping right away so the server is not left waiting on us.
        let elapsed = self.send_ping().await?;

        if let Some(map) = data.as_object_mut() {
            map.insert("time".to_owned(), elapsed.into());
        }

        self.formatter
            .apply_status(&mut data, self.format_mode, PING_CONTEXT);

        self.driver.stop().await?;
        Ok(data)
    }

    /// Fetch the status JSON as a typed [`StatusResponse`], unformatted.
    /// Closes the connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, or
    /// [`PingError::MalformedPacket`] if the server's JSON is missing
    /// required fields.
    pub async fn status(&mut self) -> Result<StatusResponse, PingError> {
        let data = self.fetch_status().await?;

        let status = StatusResponse::from_value(data)
            .map_err(|_| PingError::MalformedPacket("unexpected status shape"))?;

        self.driver.stop().await?;
        Ok(status)
    }

    /// Measure latency with a handshake and a ping/pong exchange, no
    /// status request. Returns the elapsed milliseconds and closes the
    /// connection.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a response that is not a
    /// pong.
    pub async fn ping(&mut self) -> Result<f64, PingError> {
        self.handshake().await?;
        let elapsed = self.send_ping().await?;

        self.driver.stop().await?;
        Ok(elapsed)
    }

    /// Connect if needed and declare the target. The handshake gets no
    /// response.
    async fn handshake(&mut self) -> Result<(), PingError> {
        if !self.driver.is_connected() {
            self.driver.start().await?;
        }

        let handshake = PingPacket::Handshake {
            protocol_version: self.protocol_version,
            hostname: self.host.clone(),
            port: self.port,
        };

        self.driver.send(&handshake).await
    }

    /// Handshake plus status request, returning the raw JSON tree.
    async fn fetch_status(&mut self) -> Result<Value, PingError> {
        self.handshake().await?;

        self.driver.send(&PingPacket::StatusRequest).await?;
        let response = self.driver.read().await?;

        let PingPacket::StatusResponse { data } = response else {
            return Err(PingError::MalformedPacket("expected status response"));
        };

        Ok(data)
    }

    /// Ping/pong exchange timed with a monotonic clock from just before
    /// the send to just after the response.
    async fn send_ping(&mut self) -> Result<f64, PingError> {
        let started = Instant::now();

        let request = PingPacket::PingRequest {
            ping_number: self.ping_number,
        };
        self.driver.send(&request).await?;

        let response = self.driver.read().await?;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        if response != PingPacket::Pong {
            return Err(PingError::MalformedPacket("expected pong response"));
        }

        debug!(elapsed_ms = elapsed, "pong received");
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::PingClient;
    use crate::errors::PingError;
    use crate::format::FormatMode;
    use crate::ping::PingPacket;
    use crate::varint::{decode_varint, encode_varint};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_frame(socket: &mut TcpStream) -> Vec<u8> {
        let mut length = Vec::new();

        loop {
            let byte = socket.read_u8().await.unwrap();
            length.push(byte);

            if byte & 0x80 == 0 {
                break;
            }
        }

        let (length, _) = decode_varint(&length).unwrap();
        let mut body = vec![0u8; length as usize];
        socket.read_exact(&mut body).await.unwrap();

        body
    }

    async fn write_frame(socket: &mut TcpStream, body: &[u8]) {
        socket
            .write_all(&encode_varint(body.len() as i32))
            .await
            .unwrap();
        socket.write_all(body).await.unwrap();
    }

    /// Serve one full handshake/status/ping conversation.
    async fn scripted_server(listener: TcpListener, status_json: &'static str) {
        let (mut socket, _) = listener.accept().await.unwrap();

        let handshake = read_frame(&mut socket).await;
        assert_eq!(handshake[0], 0x00);

        let status_request = read_frame(&mut socket).await;
        assert_eq!(status_request, vec![0x00]);

        let mut response = vec![0x00u8];
        response.extend_from_slice(&encode_varint(status_json.len() as i32));
        response.extend_from_slice(status_json.as_bytes());
        write_frame(&mut socket, &response).await;

        let ping = read_frame(&mut socket).await;
        assert_eq!(ping[0], 0x01);
        assert_eq!(ping.len(), 9);

        // Echo the whole ping body back as the pong.
        write_frame(&mut socket, &ping).await;
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    const STATUS_JSON: &str = r#"{"description":"A Minecraft Server","players":{"max":20,"online":0},"version":{"name":"PaperSpigot 1.8.8","protocol":47}}"#;

    #[tokio::test]
    async fn test_get_stats() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(scripted_server(listener, STATUS_JSON));

        let mut client = PingClient::new("127.0.0.1", port);
        client.set_format_mode(FormatMode::Raw);

        let stats = client.get_stats().await.unwrap();

        assert_eq!(stats["description"], json!("A Minecraft Server"));
        assert_eq!(stats["players"]["max"], json!(20));
        assert!(stats["time"].as_f64().unwrap() >= 0.0);
        assert!(!client.is_connected());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_typed() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(scripted_server(listener, STATUS_JSON));

        let mut client = PingClient::new("127.0.0.1", port);
        let status = client.status().await.unwrap();

        assert_eq!(status.version.protocol, 47);
        assert_eq!(status.players.max, 20);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_only() {
        let (listener, port) = listener().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let handshake = read_frame(&mut socket).await;
            assert_eq!(handshake[0], 0x00);

            let ping = read_frame(&mut socket).await;
            assert_eq!(ping[0], 0x01);

            write_frame(&mut socket, &ping).await;
        });

        let mut client = PingClient::new("127.0.0.1", port);
        let elapsed = client.ping().await.unwrap();

        assert!(elapsed >= 0.0);
        assert!(!client.is_connected());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_declares_target() {
        let (listener, port) = listener().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let handshake = read_frame(&mut socket).await;

            // packet id, protocol version, then the length-prefixed
            // hostname and the port.
            assert_eq!(handshake[0], 0x00);
            let (version, consumed) = decode_varint(&handshake[1..]).unwrap();
            assert_eq!(version, 47);

            let (name_len, name_consumed) = decode_varint(&handshake[1 + consumed..]).unwrap();
            let start = 1 + consumed + name_consumed;
            let hostname = &handshake[start..start + name_len as usize];
            assert_eq!(hostname, b"127.0.0.1");

            let ping = read_frame(&mut socket).await;
            write_frame(&mut socket, &ping).await;
        });

        let mut client = PingClient::with_protocol_version("127.0.0.1", port, 47);
        client.ping().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status_packet() {
        let (listener, port) = listener().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _handshake = read_frame(&mut socket).await;
            let _status_request = read_frame(&mut socket).await;

            // A pong where a status response belongs.
            write_frame(&mut socket, &[0x01, 0, 0, 0, 0, 0, 0, 0, 0]).await;
        });

        let mut client = PingClient::new("127.0.0.1", port);
        let result = client.get_stats().await;

        assert!(matches!(result, Err(PingError::MalformedPacket(_))));
        server.await.unwrap();
    }

    #[test]
    fn test_encode_matches_request_shapes() {
        // The conversation above relies on these shapes exactly.
        assert_eq!(
            &PingPacket::StatusRequest.to_bytes().unwrap()[..],
            b"\x01\x00"
        );
    }
}
