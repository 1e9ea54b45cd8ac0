use super::MAX_PACKET_SIZE;
use crate::errors::RconError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::mem::size_of;

/// Two null bytes terminating every RCON frame.
const PAD: [u8; 2] = [0, 0];

/// Request ID and request type, both little-endian [`i32`]s.
const HEADER_LEN: usize = size_of::<i32>() * 2;

/// Packet types defined by the RCON protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconPacketType {
    /// Command output from the server.
    Response = 0,

    /// Run a command.
    Command = 2,

    /// Authenticate with the server password.
    Login = 3,
}

impl From<RconPacketType> for i32 {
    fn from(packet_type: RconPacketType) -> Self {
        packet_type as i32
    }
}

/// A single RCON packet.
///
/// The wire form is `length | request id | request type | payload | pad`,
/// with all three integers as little-endian [`i32`] and the payload
/// followed by two null bytes. The length prefix counts everything after
/// itself.
///
/// `request_type` is kept as a raw integer so that packets with types this
/// crate does not define still decode; use [`RconPacketType`] when
/// constructing packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    /// Correlates responses with requests. The server echoes it back, or
    /// replies with `-1` to signal an authentication failure.
    pub request_id: i32,

    /// Raw request type field.
    pub request_type: i32,

    /// UTF-8 payload: the password, the command, or the command output.
    pub payload: String,

    /// The decoded length prefix. Zero for locally constructed packets;
    /// only used to detect fragmented responses.
    pub wire_length: i32,
}

impl RconPacket {
    /// Construct a packet to send to the server.
    pub fn new(request_id: i32, packet_type: RconPacketType, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            request_type: packet_type.into(),
            payload: payload.into(),
            wire_length: 0,
        }
    }

    /// Decode a packet from its wire form, minus the four length-prefix
    /// bytes (the driver consumes those to know how much to read).
    ///
    /// # Errors
    /// Returns [`RconError::MalformedPacket`] if the frame is truncated,
    /// the null padding is missing, or the payload is not valid UTF-8.
    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, RconError> {
        let wire_length = bytes.len() as i32;

        if bytes.len() < HEADER_LEN + PAD.len() {
            return Err(RconError::MalformedPacket("truncated packet"));
        }

        let request_id = bytes.get_i32_le();
        let request_type = bytes.get_i32_le();

        let payload_bytes = bytes.split_to(bytes.len() - PAD.len());

        if bytes[..] != PAD {
            return Err(RconError::MalformedPacket("missing null padding"));
        }

        let payload = String::from_utf8(payload_bytes.to_vec())
            .map_err(|_| RconError::MalformedPacket("payload is not valid utf-8"))?;

        Ok(Self {
            request_id,
            request_type,
            payload,
            wire_length,
        })
    }

    /// Encode this packet into its full wire form, length prefix included.
    pub fn to_bytes(&self) -> Bytes {
        let remaining = (self.payload.len() + HEADER_LEN + PAD.len()) as i32;
        let mut bytes = BytesMut::with_capacity(remaining as usize + size_of::<i32>());

        bytes.put_i32_le(remaining);
        bytes.put_i32_le(self.request_id);
        bytes.put_i32_le(self.request_type);
        bytes.put(self.payload.as_bytes());
        bytes.put_slice(&PAD);

        bytes.freeze()
    }

    /// Size of the encoded frame in bytes, length prefix included.
    pub fn wire_size(&self) -> usize {
        self.payload.len() + HEADER_LEN + PAD.len() + size_of::<i32>()
    }

    /// Whether this packet is the first of a fragmented stream.
    pub fn is_fragmented(&self) -> bool {
        self.wire_length >= MAX_PACKET_SIZE
    }
}
