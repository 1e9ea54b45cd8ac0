//! Implementations of [RCON](https://wiki.vg/RCON),
//! [Query](https://wiki.vg/Query), and
//! [Server List Ping](https://wiki.vg/Server_List_Ping) for Minecraft
//! servers.
//!
//! Each protocol gets a codec, a transport driver owning its socket, and
//! a client façade layering session state on top:
//!
//! * [`rcon::RconClient`] — authenticated remote command execution over
//!   TCP, with transparent reassembly of fragmented responses.
//! * [`query::QueryClient`] — basic and full server statistics over UDP,
//!   with the challenge-token handshake handled per request.
//! * [`ping::PingClient`] — the status/latency protocol the vanilla
//!   multiplayer screen uses, over TCP.
//!
//! The default clients are async on tokio; [`blocking`] has synchronous
//! twins over `std::net` with identical wire behavior. Formatting codes
//! in server output are handled by the pluggable [`format`] layer.
//!
//! # Examples
//!
//! ```no_run
//! use mc_client::ping::PingClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut client = PingClient::with_default_port("mc.hypixel.net");
//!
//!     match client.get_stats().await {
//!         Ok(stats) => println!("{stats:#?}"),
//!         Err(err) => eprintln!("ping failed: {err}"),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod blocking;
pub mod driver;
pub mod errors;
pub mod format;
pub mod ping;
pub mod query;
pub mod rcon;
mod socket;
mod varint;

/// Request IDs are fixed per client instance and only need to be unlikely
/// to collide with another session against the same server; seconds since
/// the epoch is what servers have seen from clients for years.
pub(crate) fn gen_request_id() -> i32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i32
}
