//! Remote command execution over the [RCON](https://wiki.vg/RCON) protocol.
//!
//! See the documentation for [`RconClient`] for more information. A
//! blocking variant lives at [`crate::blocking::RconClient`].

mod client;
mod driver;
mod packet;

pub use client::{CommandOptions, RconClient};
pub use driver::RconDriver;
pub use packet::{RconPacket, RconPacketType};

/// The port RCON servers listen on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 25575;

/// Wire length at or above which a response is part of a fragmented
/// stream and more packets follow.
pub(crate) const MAX_PACKET_SIZE: i32 = 4096;

/// Outgoing frames this long or longer risk being truncated server-side.
pub(crate) const MAX_OUTGOING_SIZE: usize = 1460;

/// Payload of the response packet that terminates a fragmented stream,
/// sent by the server in reaction to our junk packet.
pub(crate) const FRAGMENT_TERMINATOR: &str = "Unknown request 0";
