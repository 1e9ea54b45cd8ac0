//! Server statistics over the [Query](https://wiki.vg/Query) protocol.
//!
//! Query is a UDP, GameSpot/UT3-style protocol. Every stats request must
//! be authorized with a challenge token obtained through a handshake, and
//! tokens rotate server-side roughly every 30 seconds, so the client
//! performs a fresh handshake before each request. See [`QueryClient`].
//!
//! A blocking variant lives at [`crate::blocking::QueryClient`].

mod client;
mod driver;
mod packet;

pub use client::{FullStats, QueryClient};
pub use driver::QueryDriver;
pub use packet::{QueryData, QueryPacket, QueryPacketType};

/// The port the Query listener shares with the game server by default.
pub const DEFAULT_PORT: u16 = 25565;

/// Magic bytes prefixing every serverbound Query datagram.
pub(crate) const MAGIC: [u8; 2] = [0xfe, 0xfd];

/// The server only honors these bit positions of the session ID, and
/// echoes the masked value back.
pub(crate) const SESSION_MASK: i32 = 0x0f0f_0f0f;
