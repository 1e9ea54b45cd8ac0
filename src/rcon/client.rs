use super::{RconDriver, RconPacket, RconPacketType, DEFAULT_PORT, FRAGMENT_TERMINATOR};
use crate::driver::Driver;
use crate::errors::RconError;
use crate::format::{DefaultFormatter, FormatMode, Formatter};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Session state guarded together with the driver, so that one caller's
/// send/read cycle can never interleave with another's. RCON correlates
/// responses with requests purely by arrival order on the stream.
#[derive(Debug)]
struct Session {
    driver: RconDriver,
    authenticated: bool,
}

/// Per-command switches. Every check is on by default; disabling any of
/// them trades safety for raw protocol access.
#[derive(Debug, Clone, Copy)]
pub struct CommandOptions {
    /// Refuse to send before a successful [`RconClient::login`].
    pub check_auth: bool,

    /// Detect and reassemble fragmented responses.
    pub frag_check: bool,

    /// Refuse to send frames large enough to be truncated server-side.
    pub length_check: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            check_auth: true,
            frag_check: true,
            length_check: true,
        }
    }
}

/// Client for the RCON protocol, allowing remote command execution on a
/// Minecraft server.
///
/// The connection is opened lazily on the first operation and must be
/// re-opened with [`start`](RconClient::start) after any fatal error. The
/// client can be shared between tasks; concurrent commands are serialized
/// internally.
///
/// # Examples
///
/// ```no_run
/// use mc_client::rcon::RconClient;
/// use mc_client::errors::RconError;
///
/// #[tokio::main]
/// async fn main() -> Result<(), RconError> {
///     let client = RconClient::new("localhost", 25575);
///     client.login("password").await?;
///
///     let output = client.command("time set day").await?;
///     println!("{output}");
///
///     client.stop().await
/// }
/// ```
pub struct RconClient {
    session: Mutex<Session>,
    request_id: i32,
    format_mode: FormatMode,
    formatter: Box<dyn Formatter>,
}

impl RconClient {
    /// Create a client for the given host and port. The request ID used to
    /// correlate responses is derived from the wall clock; see
    /// [`with_request_id`](RconClient::with_request_id) to pick one.
    ///
    /// Use [`DEFAULT_PORT`] unless the server is configured otherwise.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_request_id(host, port, crate::gen_request_id())
    }

    /// Create a client with a caller-supplied request ID. The ID is fixed
    /// for the lifetime of the client.
    pub fn with_request_id(host: &str, port: u16, request_id: i32) -> Self {
        Self {
            session: Mutex::new(Session {
                driver: RconDriver::new(host, port),
                authenticated: false,
            }),
            request_id,
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
        self.session.get_mut().driver.set_timeout(timeout);
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
    pub async fn start(&self) -> Result<(), RconError> {
        self.session.lock().await.driver.start().await
    }

    /// Close the connection and drop authentication state.
    ///
    /// # Errors
    /// Returns `Err` if the socket could not be shut down cleanly.
    pub async fn stop(&self) -> Result<(), RconError> {
        let mut session = self.session.lock().await;
        session.authenticated = false;
        session.driver.stop().await
    }

    /// Whether the underlying connection is open.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.driver.is_connected()
    }

    /// Whether a previous [`login`](RconClient::login) succeeded.
    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.authenticated
    }

    /// Authenticate with the server.
    ///
    /// Returns `true` on success, or `false` if the server rejected the
    /// password. Already being authenticated is a success without any
    /// network traffic.
    ///
    /// # Errors
    /// Returns `Err` on a network failure or a malformed response.
    pub async fn login(&self, password: &str) -> Result<bool, RconError> {
        let mut session = self.session.lock().await;

        if session.authenticated {
            return Ok(true);
        }

        let response = self
            .raw_send(&mut session, RconPacketType::Login, password, true, true)
            .await?;

        // The server replies with our ID on success and -1 on failure.
        if response.request_id != self.request_id {
            debug!("rcon authentication rejected");
            return Ok(false);
        }

        session.authenticated = true;
        Ok(true)
    }

    /// Alias for [`login`](RconClient::login).
    ///
    /// # Errors
    /// Same as [`login`](RconClient::login).
    pub async fn authenticate(&self, password: &str) -> Result<bool, RconError> {
        self.login(password).await
    }

    /// Run a command on the server and return its output, with all checks
    /// enabled and the session's formatting applied.
    ///
    /// # Errors
    /// Returns [`RconError::Authentication`] when not logged in, or any
    /// error [`command_with`](RconClient::command_with) can return.
    pub async fn command(&self, command: &str) -> Result<String, RconError> {
        self.command_with(command, CommandOptions::default()).await
    }

    /// Run a command with explicit [`CommandOptions`].
    ///
    /// Fragmented responses are reassembled transparently when
    /// `frag_check` is on: the driver keeps reading continuation packets
    /// until the server acknowledges a junk packet we send after the
    /// oversized response.
    ///
    /// # Errors
    /// Returns [`RconError::Authentication`] if `check_auth` is on and no
    /// login has succeeded (nothing is sent in that case),
    /// [`RconError::PayloadTooLong`] if `length_check` is on and the
    /// command is too large, or [`RconError::MalformedPacket`] for
    /// responses that do not belong to this session.
    pub async fn command_with(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<String, RconError> {
        let mut session = self.session.lock().await;

        if options.check_auth && !session.authenticated {
            return Err(RconError::Authentication);
        }

        let response = self
            .raw_send(
                &mut session,
                RconPacketType::Command,
                command,
                options.frag_check,
                options.length_check,
            )
            .await?;

        Ok(self
            .formatter
            .apply(&response.payload, self.format_mode, command))
    }

    /// One full request/response cycle, with fragmentation reassembly.
    async fn raw_send(
        &self,
        session: &mut Session,
        packet_type: RconPacketType,
        payload: &str,
        frag_check: bool,
        length_check: bool,
    ) -> Result<RconPacket, RconError> {
        if !session.driver.is_connected() {
            session.driver.start().await?;
        }

        let request = RconPacket::new(self.request_id, packet_type, payload);
        session.driver.send_checked(&request, length_check).await?;

        let mut response = session.driver.read().await?;

        if response.request_id != self.request_id && packet_type != RconPacketType::Login {
            if session.authenticated {
                return Err(RconError::MalformedPacket("request id mismatch"));
            }

            return Err(RconError::Authentication);
        }

        if frag_check && response.is_fragmented() {
            debug!(
                wire_length = response.wire_length,
                "fragmented rcon response, reassembling"
            );

            // A zero-length junk packet; the server's complaint about it
            // marks the end of the fragment stream.
            let junk = RconPacket::new(self.request_id, RconPacketType::Response, "");
            session.driver.send_checked(&junk, false).await?;

            loop {
                let fragment = session.driver.read().await?;

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
