//! All the errors defined by this crate.
//!
//! Each protocol has its own error enum, and all of them embed
//! [`ProtocolError`] for failures at the transport level. Wire format
//! violations surface immediately; nothing is retried internally.

use std::io;
use thiserror::Error;

/// A transport-level error, shared by every protocol in this crate.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The remote host closed the stream. The local socket is shut down
    /// before this is returned, so the driver must be restarted before
    /// further use.
    #[error("connection closed by remote host")]
    ConnectionClosed,

    /// A socket operation did not complete within the configured timeout.
    #[error("socket operation timed out")]
    Timeout,

    /// VarInt data was invalid according to the wire format.
    #[error("invalid varint data")]
    InvalidVarInt,

    /// Any other I/O failure from the underlying socket.
    #[error("socket i/o error")]
    Io(#[from] io::Error),
}

/// An error from the RCON protocol.
#[derive(Error, Debug)]
pub enum RconError {
    /// A transport-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Not authenticated with the server, or the server refused to serve
    /// us before authentication completed (request ID mismatch pre-auth).
    #[error("not authenticated with the rcon server")]
    Authentication,

    /// The packet received was malformed, or not the packet we expected.
    /// This includes request ID mismatches after authentication.
    #[error("malformed rcon packet: {0}")]
    MalformedPacket(&'static str),

    /// The outgoing packet is too large and would be truncated or dropped
    /// by the server. Raised when length checking is enabled and the
    /// encoded frame is 1460 bytes or more.
    #[error("outgoing rcon packet too long ({0} bytes)")]
    PayloadTooLong(usize),

    /// Expected data from the server but none arrived.
    #[error("no data received from the rcon server")]
    Communication,
}

/// An error from the Query protocol.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A transport-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The response packet type did not match the request we sent.
    #[error("unexpected query packet type")]
    UnexpectedPacketType,

    /// The response carried a session ID other than ours.
    #[error("session id mismatch")]
    SessionIdMismatch,

    /// The handshake response did not contain a parseable challenge token.
    #[error("invalid challenge token")]
    InvalidChallengeToken,

    /// The response payload was truncated or otherwise unparseable.
    #[error("malformed query packet: {0}")]
    MalformedPacket(&'static str),
}

/// An error from the Server List Ping protocol.
#[derive(Error, Debug)]
pub enum PingError {
    /// A transport-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The inner packet tag was not one this protocol defines, or the
    /// status payload was not valid JSON.
    #[error("malformed ping packet: {0}")]
    MalformedPacket(&'static str),

    /// Caller error: tried to encode a packet shape that only the server
    /// may send (status response, pong).
    #[error("packet type is not serverbound")]
    NotServerbound,
}
