use super::{QueryData, QueryDriver, QueryPacket, QueryPacketType, DEFAULT_PORT, SESSION_MASK};
use crate::driver::Driver;
use crate::errors::QueryError;
use crate::format::{DefaultFormatter, FormatMode, Formatter, QUERY_CONTEXT};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Full statistics for a server: arbitrary key/value pairs plus the list
/// of online players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullStats {
    /// Key/value statistics. Keys match what the server sends, except
    /// `hostname`, which is renamed `motd` to line up with basic stats.
    pub stats: HashMap<String, String>,

    /// Names of online players.
    pub players: Vec<String>,
}

/// Client for the Query protocol, reading server statistics over UDP.
///
/// Each stats call performs its own handshake first: challenge tokens
/// rotate server-side roughly every 30 seconds and there is no way to
/// detect a stale one, so nothing is cached.
///
/// # Examples
///
/// ```no_run
/// use mc_client::query::QueryClient;
/// use mc_client::errors::QueryError;
///
/// #[tokio::main]
/// async fn main() -> Result<(), QueryError> {
///     let mut client = QueryClient::new("localhost", 25565);
///
///     let stats = client.get_basic_stats().await?;
///     println!("{} is on {}", stats["motd"], stats["map"]);
///
///     client.stop().await
/// }
/// ```
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
    ///
    /// Use [`DEFAULT_PORT`] unless the server is configured otherwise.
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
    pub async fn start(&mut self) -> Result<(), QueryError> {
        self.driver.start().await
    }

    /// Release the socket. UDP has no connection to tear down, but being
    /// explicit about when network use ends is still good manners.
    ///
    /// # Errors
    /// Infallible for UDP; present for symmetry with the other clients.
    pub async fn stop(&mut self) -> Result<(), QueryError> {
        self.driver.stop().await
    }

    /// Whether [`start`](QueryClient::start) has been called.
    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Perform a handshake and return the challenge token.
    ///
    /// Tokens are short-lived server-side; call this immediately before
    /// the request it authorizes. The stats methods already do.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or an unparseable response.
    pub async fn get_challenge(&mut self) -> Result<i32, QueryError> {
        let response = self
            .raw_send(QueryPacketType::HandshakeRequest, -1)
            .await?;

        if response.packet_type != QueryPacketType::HandshakeResponse {
            return Err(QueryError::UnexpectedPacketType);
        }

        debug!(token = response.challenge_token, "challenge received");
        Ok(response.challenge_token)
    }

    /// Fetch basic statistics: motd, game type, map, player counts, and
    /// the host address, all as strings keyed the way the server sends
    /// them.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, a session ID mismatch, or an
    /// unparseable response.
    pub async fn get_basic_stats(&mut self) -> Result<HashMap<String, String>, QueryError> {
        let challenge = self.get_challenge().await?;
        let response = self.raw_send(QueryPacketType::BasicRequest, challenge).await?;

        let QueryData::Basic(mut stats) = response.data else {
            return Err(QueryError::UnexpectedPacketType);
        };

        self.formatter
            .apply_stats(&mut stats, None, self.format_mode, QUERY_CONTEXT);

        Ok(stats)
    }

    /// Fetch full statistics: every key/value pair the server reports
    /// plus the player list.
    ///
    /// # Errors
    /// Returns `Err` on a network failure, a session ID mismatch, or an
    /// unparseable response.
    pub async fn get_full_stats(&mut self) -> Result<FullStats, QueryError> {
        let challenge = self.get_challenge().await?;
        let response = self.raw_send(QueryPacketType::FullRequest, challenge).await?;

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

    /// One request/response cycle, with the session ID checked against
    /// the masked value the server echoes.
    async fn raw_send(
        &mut self,
        packet_type: QueryPacketType,
        challenge_token: i32,
    ) -> Result<QueryPacket, QueryError> {
        if !self.driver.is_connected() {
            self.driver.start().await?;
        }

        let request = QueryPacket::request(packet_type, self.request_id, challenge_token);
        self.driver.send(&request).await?;

        let response = self.driver.read().await?;

        if response.request_id != self.request_id & SESSION_MASK {
            return Err(QueryError::SessionIdMismatch);
        }

        Ok(response)
    }
}
