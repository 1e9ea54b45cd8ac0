//! The transport driver interface shared by the three protocols.
//!
//! A driver owns exactly one socket for its lifetime and knows how to frame
//! packets over it. Client façades hold a driver and layer session state
//! (authentication, request IDs, challenge tokens) on top. See
//! [`crate::rcon::RconDriver`], [`crate::query::QueryDriver`] and
//! [`crate::ping::PingDriver`] for the implementations.

use async_trait::async_trait;
use std::time::Duration;

/// Timeout applied to socket reads unless the caller overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection lifecycle and framed packet I/O for one protocol.
///
/// `start` must be idempotent, and `stop` must leave the driver in a state
/// where `start` can be called again. Every read is bounded by the
/// configured timeout; a remote close surfaces as
/// [`ProtocolError::ConnectionClosed`](crate::errors::ProtocolError::ConnectionClosed)
/// after the driver has shut its own socket down.
#[async_trait]
pub trait Driver {
    /// The packet type this driver frames.
    type Packet;

    /// The error type for this protocol.
    type Error;

    /// Open the underlying transport. No-op if already connected.
    async fn start(&mut self) -> Result<(), Self::Error>;

    /// Close the underlying transport.
    async fn stop(&mut self) -> Result<(), Self::Error>;

    /// Encode and write one packet.
    async fn send(&mut self, packet: &Self::Packet) -> Result<(), Self::Error>;

    /// Read and decode one packet.
    async fn read(&mut self) -> Result<Self::Packet, Self::Error>;

    /// Change the timeout for future socket reads. `None` waits forever.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Whether the transport is currently open.
    fn is_connected(&self) -> bool;
}
