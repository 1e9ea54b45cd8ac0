use crate::errors::PingError;
use crate::varint::{decode_varint, encode_varint};
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

/// Inner packet ID shared by the handshake, the status request, and the
/// status response.
const STATUS_ID: u8 = 0x00;

/// Inner packet ID shared by the ping request and the pong response.
const PING_ID: u8 = 0x01;

/// Next-state value asking the server to move to the status phase.
const NEXT_STATE_STATUS: i32 = 1;

/// A single Server List Ping packet.
///
/// Every wire packet is prefixed with a VarInt counting the bytes that
/// follow; the shapes of the bodies are otherwise unrelated, so each
/// exchange step is its own variant. Only the serverbound variants encode;
/// only the clientbound ones come out of [`from_bytes`](PingPacket::from_bytes).
#[derive(Debug, Clone, PartialEq)]
pub enum PingPacket {
    /// Opens the conversation. Carries the real target address even
    /// though the socket is already connected there: the protocol layer
    /// is address-agnostic of the transport, and some servers check.
    Handshake {
        /// Protocol version to emulate; 0 lets modern servers answer
        /// with whatever they are.
        protocol_version: i32,

        /// Hostname the client used to reach the server.
        hostname: String,

        /// Port the client used to reach the server.
        port: u16,
    },

    /// Asks for the status JSON.
    StatusRequest,

    /// The status JSON the server advertises.
    StatusResponse {
        /// Parsed JSON tree.
        data: Value,
    },

    /// Asks the server to echo a number back, for latency measurement.
    PingRequest {
        /// Arbitrary number the server echoes in its pong.
        ping_number: u64,
    },

    /// The server's echo of a ping request.
    Pong,
}

impl PingPacket {
    /// Encode this packet, length prefix included.
    ///
    /// # Errors
    /// Returns [`PingError::NotServerbound`] for the response-only
    /// variants, which have no serverbound wire form.
    pub fn to_bytes(&self) -> Result<Bytes, PingError> {
        let body = match self {
            Self::Handshake {
                protocol_version,
                hostname,
                port,
            } => {
                let mut body = BytesMut::new();

                body.put_u8(STATUS_ID);
                body.put(encode_varint(*protocol_version));
                body.put(encode_varint(hostname.len() as i32));
                body.put(hostname.as_bytes());
                body.put_u16(*port);
                body.put(encode_varint(NEXT_STATE_STATUS));

                body
            }
            Self::StatusRequest => {
                let mut body = BytesMut::new();
                body.put_u8(STATUS_ID);
                body
            }
            Self::PingRequest { ping_number } => {
                let mut body = BytesMut::new();
                body.put_u8(PING_ID);
                body.put_u64(*ping_number);
                body
            }
            Self::StatusResponse { .. } | Self::Pong => return Err(PingError::NotServerbound),
        };

        let mut bytes = BytesMut::with_capacity(body.len() + 1);
        bytes.put(encode_varint(body.len() as i32));
        bytes.put(body);

        Ok(bytes.freeze())
    }

    /// Decode a packet body, without the outer length prefix (the driver
    /// consumes that to know how much to read).
    ///
    /// Status JSON is parsed permissively: invalid UTF-8 is replaced
    /// rather than rejected, and anything trailing the first JSON value
    /// is ignored. Some servers pad or mangle their status payloads.
    ///
    /// # Errors
    /// Returns [`PingError::MalformedPacket`] for an unknown inner tag or
    /// a status payload with no parseable JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PingError> {
        let (tag, tag_len) = decode_varint(bytes).map_err(PingError::from)?;

        match tag {
            0 => {
                // The second varint carries the JSON's claimed length,
                // which we note and ignore in favor of what is actually
                // there.
                let (_claimed, claimed_len) =
                    decode_varint(&bytes[tag_len..]).map_err(PingError::from)?;

                let text = String::from_utf8_lossy(&bytes[tag_len + claimed_len..]);
                let data = serde_json::Deserializer::from_str(&text)
                    .into_iter::<Value>()
                    .next()
                    .and_then(Result::ok)
                    .ok_or(PingError::MalformedPacket("unparseable status json"))?;

                Ok(Self::StatusResponse { data })
            }
            1 => Ok(Self::Pong),
            _ => Err(PingError::MalformedPacket("unknown packet tag")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PingPacket;
    use serde_json::json;

    #[test]
    fn test_encode_handshake() {
        let packet = PingPacket::Handshake {
            protocol_version: 0,
            hostname: "localhost".to_owned(),
            port: 25565,
        };

        assert_eq!(
            &packet.to_bytes().unwrap()[..],
            b"\x0f\x00\x00\x09localhostc\xdd\x01"
        );
    }

    #[test]
    fn test_encode_status_request() {
        assert_eq!(&PingPacket::StatusRequest.to_bytes().unwrap()[..], b"\x01\x00");
    }

    #[test]
    fn test_encode_ping_request() {
        let packet = PingPacket::PingRequest { ping_number: 55 };

        assert_eq!(
            &packet.to_bytes().unwrap()[..],
            b"\x09\x01\x00\x00\x00\x00\x00\x00\x007"
        );
    }

    #[test]
    fn test_encode_response_shapes_rejected() {
        assert!(PingPacket::Pong.to_bytes().is_err());
        assert!(PingPacket::StatusResponse { data: json!({}) }
            .to_bytes()
            .is_err());
    }

    #[test]
    fn test_decode_status_response() {
        let bytes = b"\x00y{\"description\":\"A Minecraft Server\",\"players\":{\"max\":20,\"online\":0},\"version\":{\"name\":\"PaperSpigot 1.8.8\",\"protocol\":47}}";
        let packet = PingPacket::from_bytes(bytes).unwrap();

        let PingPacket::StatusResponse { data } = packet else {
            panic!("expected status response");
        };

        assert_eq!(data["description"], json!("A Minecraft Server"));
        assert_eq!(data["players"], json!({"max": 20, "online": 0}));
        assert_eq!(data["version"]["protocol"], json!(47));
    }

    #[test]
    fn test_decode_status_ignores_trailing_garbage() {
        let bytes = b"\x00\x02{}\xff\xfejunk";
        let packet = PingPacket::from_bytes(bytes).unwrap();

        assert!(matches!(packet, PingPacket::StatusResponse { .. }));
    }

    #[test]
    fn test_decode_pong() {
        let packet = PingPacket::from_bytes(b"\x01\x00\x00\x00\x00e\xee\x3f\xe2").unwrap();
        assert_eq!(packet, PingPacket::Pong);
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert!(PingPacket::from_bytes(b"\x07rest").is_err());
    }
}
