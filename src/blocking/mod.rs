//! Blocking variants of the drivers and clients.
//!
//! Wire behavior, packet types and codecs are shared with the async half
//! of the crate; only the transport differs. These clients block the
//! calling thread for up to the configured timeout on every socket
//! operation and expect one operation in flight at a time, which their
//! `&mut self` receivers enforce. No async runtime is required.
//!
//! # Examples
//!
//! ```no_run
//! use mc_client::blocking::RconClient;
//!
//! let mut client = RconClient::new("localhost", 25575);
//! client.login("password")?;
//!
//! let output = client.command("time set day")?;
//! println!("{output}");
//! # Ok::<(), mc_client::errors::RconError>(())
//! ```

mod ping;
mod query;
mod rcon;
mod socket;

pub use ping::{PingClient, PingDriver};
pub use query::{QueryClient, QueryDriver};
pub use rcon::{RconClient, RconDriver};

use std::time::Duration;

/// Blocking counterpart of [`crate::driver::Driver`]: connection
/// lifecycle and framed packet I/O for one protocol, same contract, no
/// suspension.
pub trait Driver {
    /// The packet type this driver frames.
    type Packet;

    /// The error type for this protocol.
    type Error;

    /// Open the underlying transport. No-op if already connected.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Close the underlying transport.
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Encode and write one packet.
    fn send(&mut self, packet: &Self::Packet) -> Result<(), Self::Error>;

    /// Read and decode one packet.
    fn read(&mut self) -> Result<Self::Packet, Self::Error>;

    /// Change the timeout for future socket reads. `None` waits forever.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Whether the transport is currently open.
    fn is_connected(&self) -> bool;
}
