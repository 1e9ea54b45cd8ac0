//! Server status and latency over the
//! [Server List Ping](https://wiki.vg/Server_List_Ping) protocol.
//!
//! This is the TCP protocol the vanilla client uses to populate its
//! server list: a handshake declaring the target, an optional status
//! request returning the JSON the server advertises, and a ping/pong
//! exchange for latency. See [`PingClient`].
//!
//! A blocking variant lives at [`crate::blocking::PingClient`].

mod client;
mod data;
mod driver;
mod packet;

pub use client::PingClient;
pub use data::{Players, Sample, StatusResponse, Version};
pub use driver::PingDriver;
pub use packet::PingPacket;

/// The port Minecraft servers listen on by default.
pub const DEFAULT_PORT: u16 = 25565;
