use super::{MAGIC, SESSION_MASK};
use crate::errors::QueryError;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

/// Positional keys of a basic stats response, in wire order.
const BASIC_KEYS: [&str; 7] = [
    "motd",
    "gametype",
    "map",
    "numplayers",
    "maxplayers",
    "hostport",
    "hostip",
];

/// Marker separating the key/value section from the player list in a full
/// stats response.
const PLAYER_MARKER: &[u8] = b"\x00\x01player_\x00\x00";

/// Packet types in the Query exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPacketType {
    /// Client asks for basic statistics.
    BasicRequest = 0,

    /// Server responds with basic statistics.
    BasicResponse = 1,

    /// Client asks for full statistics.
    FullRequest = 2,

    /// Server responds with full statistics.
    FullResponse = 3,

    /// Client asks for a challenge token.
    HandshakeRequest = 5,

    /// Server acknowledges with a challenge token.
    HandshakeResponse = 6,
}

impl QueryPacketType {
    /// The on-wire request type byte this packet type implies: 9 for the
    /// handshake, 0 for stat requests.
    pub(crate) fn request_type(self) -> u8 {
        match self {
            Self::HandshakeRequest | Self::HandshakeResponse => 9,
            _ => 0,
        }
    }
}

/// Decoded payload of a Query packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    /// No payload: requests, and handshake responses (whose challenge
    /// token lives in [`QueryPacket::challenge_token`]).
    None,

    /// The seven fixed fields of a basic stats response.
    Basic(HashMap<String, String>),

    /// Key/value pairs and the player list of a full stats response.
    Full {
        /// Arbitrary key/value statistics.
        stats: HashMap<String, String>,

        /// Names of online players.
        players: Vec<String>,
    },
}

/// A single Query packet.
///
/// Serverbound datagrams are `0xFEFD | type | session id`, with the
/// challenge token appended for stat requests and four bytes of padding
/// for full stat requests. The session ID is masked with the bits the
/// server honors before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPacket {
    /// What this packet is, derived from the payload shape when decoding.
    pub packet_type: QueryPacketType,

    /// The on-wire request type byte. `None` derives it from
    /// `packet_type` when encoding; decoded packets carry the byte the
    /// server sent.
    pub request_type: Option<u8>,

    /// Session ID correlating requests and responses.
    pub request_id: i32,

    /// Challenge token authorizing stat requests, `-1` when absent.
    pub challenge_token: i32,

    /// Decoded payload.
    pub data: QueryData,
}

impl QueryPacket {
    /// Construct a serverbound packet with an auto-derived request type.
    pub fn request(packet_type: QueryPacketType, request_id: i32, challenge_token: i32) -> Self {
        Self {
            packet_type,
            request_type: None,
            request_id,
            challenge_token,
            data: QueryData::None,
        }
    }

    /// Encode this packet into a datagram.
    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = BytesMut::new();

        bytes.put_slice(&MAGIC);
        bytes.put_u8(
            self.request_type
                .unwrap_or_else(|| self.packet_type.request_type()),
        );
        bytes.put_i32(self.request_id & SESSION_MASK);

        if matches!(
            self.packet_type,
            QueryPacketType::BasicRequest | QueryPacketType::FullRequest
        ) {
            bytes.put_i32(self.challenge_token);
        }

        if self.packet_type == QueryPacketType::FullRequest {
            bytes.put_bytes(0, 4);
        }

        bytes.freeze()
    }

    /// Decode a clientbound datagram.
    ///
    /// The payload shape decides what the packet is: a single token is a
    /// handshake response carrying an ASCII challenge token; up to seven
    /// tokens (not led by `splitnum`) are basic stats mapped onto fixed
    /// keys; anything else is a full stats response. This mirrors what
    /// vanilla servers actually emit; there is no formal schema.
    ///
    /// # Errors
    /// Returns [`QueryError::InvalidChallengeToken`] for an unparseable
    /// handshake, or [`QueryError::MalformedPacket`] for truncated or
    /// unsplittable stats payloads.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, QueryError> {
        if bytes.len() < 5 {
            return Err(QueryError::MalformedPacket("truncated packet"));
        }

        let request_type = bytes[0];
        let request_id = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let payload = trim_trailing_nulls(&bytes[5..]);
        let tokens: Vec<&[u8]> = payload.split(|&byte| byte == 0).collect();

        if tokens.len() == 1 {
            let challenge_token = std::str::from_utf8(tokens[0])
                .ok()
                .and_then(|token| token.parse::<i32>().ok())
                .ok_or(QueryError::InvalidChallengeToken)?;

            return Ok(Self {
                packet_type: QueryPacketType::HandshakeResponse,
                request_type: Some(request_type),
                request_id,
                challenge_token,
                data: QueryData::None,
            });
        }

        if tokens[0] != b"splitnum" && tokens.len() <= BASIC_KEYS.len() {
            return Ok(Self {
                packet_type: QueryPacketType::BasicResponse,
                request_type: Some(request_type),
                request_id,
                challenge_token: -1,
                data: QueryData::Basic(decode_basic(&tokens)?),
            });
        }

        let (stats, players) = decode_full(bytes)?;

        Ok(Self {
            packet_type: QueryPacketType::FullResponse,
            request_type: Some(request_type),
            request_id,
            challenge_token: -1,
            data: QueryData::Full { stats, players },
        })
    }
}

/// Map basic stats tokens onto their positional keys.
///
/// The sixth field is special: it starts with the host port as an embedded
/// little-endian short, and the rest of that token is the host IP.
fn decode_basic(tokens: &[&[u8]]) -> Result<HashMap<String, String>, QueryError> {
    let mut stats = HashMap::new();

    for (index, token) in tokens.iter().enumerate() {
        let (mut index, mut token) = (index, *token);

        if index == 5 {
            if token.len() < 2 {
                return Err(QueryError::MalformedPacket("truncated hostport field"));
            }

            let port = u16::from_le_bytes([token[0], token[1]]);
            stats.insert(BASIC_KEYS[5].to_owned(), port.to_string());

            token = &token[2..];
            index = 6;
        }

        stats.insert(BASIC_KEYS[index].to_owned(), decode_value(token));
    }

    Ok(stats)
}

/// Parse the key/value section and player list of a full stats response.
///
/// The payload needs a few fixups before it splits cleanly on null bytes:
/// the `hostname` key is renamed to `motd` (matching the basic response),
/// empty values (double nulls) get a space inserted, and one leading null
/// is dropped.
fn decode_full(bytes: &[u8]) -> Result<(HashMap<String, String>, Vec<String>), QueryError> {
    // 5 header bytes are already consumed; 10 more cover the constant
    // "splitnum" preamble.
    if bytes.len() < 15 {
        return Err(QueryError::MalformedPacket("truncated full stats payload"));
    }

    let body = &bytes[15..];
    let marker = find_subsequence(body, PLAYER_MARKER)
        .ok_or(QueryError::MalformedPacket("missing player list marker"))?;

    let mut section = body[..marker].to_vec();
    replace_first(&mut section, b"hostname", b"motd");
    section = replace_all(&section, b"\x00\x00", b"\x00 \x00");
    replace_first(&mut section, b"\x00", b"");
    let section = trim_trailing_nulls(&section);

    let pairs: Vec<&[u8]> = section.split(|&byte| byte == 0).collect();
    if pairs.len() % 2 != 0 {
        return Err(QueryError::MalformedPacket("unbalanced key/value section"));
    }

    let mut stats = HashMap::new();
    for pair in pairs.chunks_exact(2) {
        let key = String::from_utf8(pair[0].to_vec())
            .map_err(|_| QueryError::MalformedPacket("key is not valid utf-8"))?;

        stats.insert(key, decode_value(pair[1]));
    }

    let players = trim_trailing_nulls(&body[marker + PLAYER_MARKER.len()..])
        .split(|&byte| byte == 0)
        .map(|name| {
            String::from_utf8(name.to_vec())
                .map_err(|_| QueryError::MalformedPacket("player name is not valid utf-8"))
        })
        .collect::<Result<Vec<String>, QueryError>>()?;

    Ok((stats, players))
}

/// Decode a value as Latin-1, preserving the raw server bytes, with the
/// escape byte `0x1b` spelled out as the six literal characters `\u001b`.
fn decode_value(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());

    for &byte in bytes {
        if byte == 0x1b {
            out.push_str("\\u001b");
        } else {
            out.push(char::from(byte));
        }
    }

    out
}

fn trim_trailing_nulls(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&byte| byte != 0)
        .map_or(0, |position| position + 1);

    &bytes[..end]
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn replace_first(bytes: &mut Vec<u8>, needle: &[u8], replacement: &[u8]) {
    if let Some(position) = find_subsequence(bytes, needle) {
        bytes.splice(position..position + needle.len(), replacement.iter().copied());
    }
}

fn replace_all(bytes: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut position = 0;

    while position < bytes.len() {
        if bytes[position..].starts_with(needle) {
            out.extend_from_slice(replacement);
            position += needle.len();
        } else {
            out.push(bytes[position]);
            position += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{QueryData, QueryPacket, QueryPacketType};
    use std::collections::HashMap;

    #[test]
    fn test_encode_handshake_auto() {
        let packet = QueryPacket::request(QueryPacketType::HandshakeRequest, 1, -1);
        assert_eq!(&packet.to_bytes()[..], b"\xfe\xfd\x09\x00\x00\x00\x01");
    }

    #[test]
    fn test_encode_handshake_manual_type() {
        let mut packet = QueryPacket::request(QueryPacketType::HandshakeRequest, 2, -1);
        packet.request_type = Some(4);

        assert_eq!(&packet.to_bytes()[..], b"\xfe\xfd\x04\x00\x00\x00\x02");
    }

    #[test]
    fn test_encode_basic_request() {
        let packet = QueryPacket::request(QueryPacketType::BasicRequest, 5, 55);
        assert_eq!(
            &packet.to_bytes()[..],
            b"\xfe\xfd\x00\x00\x00\x00\x05\x00\x00\x007"
        );
    }

    #[test]
    fn test_encode_full_request() {
        let packet = QueryPacket::request(QueryPacketType::FullRequest, 7, 77);
        assert_eq!(
            &packet.to_bytes()[..],
            b"\xfe\xfd\x00\x00\x00\x00\x07\x00\x00\x00M\x00\x00\x00\x00"
        );
    }

    #[test]
    fn test_encode_masks_session_id() {
        let packet = QueryPacket::request(QueryPacketType::HandshakeRequest, -1, -1);
        // -1 & 0x0f0f0f0f
        assert_eq!(&packet.to_bytes()[..], b"\xfe\xfd\x09\x0f\x0f\x0f\x0f");
    }

    #[test]
    fn test_decode_handshake() {
        let packet = QueryPacket::from_bytes(b"\x09\x00\x00\x00\x031234").unwrap();

        assert_eq!(packet.packet_type, QueryPacketType::HandshakeResponse);
        assert_eq!(packet.request_type, Some(9));
        assert_eq!(packet.request_id, 3);
        assert_eq!(packet.challenge_token, 1234);
        assert_eq!(packet.data, QueryData::None);
    }

    #[test]
    fn test_decode_basic() {
        let bytes = b"\x00\x05\x0e\x08\x07A Minecraft Server\x00SMP\x00world\x000\x0020\x00\xddc127.0.0.1\x00";
        let packet = QueryPacket::from_bytes(bytes).unwrap();

        assert_eq!(packet.packet_type, QueryPacketType::BasicResponse);
        assert_eq!(packet.request_id, 84_805_639);

        let expected: HashMap<String, String> = [
            ("motd", "A Minecraft Server"),
            ("gametype", "SMP"),
            ("map", "world"),
            ("numplayers", "0"),
            ("maxplayers", "20"),
            ("hostport", "25565"),
            ("hostip", "127.0.0.1"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();

        assert_eq!(packet.data, QueryData::Basic(expected));
    }

    #[test]
    fn test_decode_full() {
        let bytes = b"\x00\x05\x0e\x08\x07splitnum\x00\x80\x00hostname\x00A Minecraft Server\x00gametype\x00SMP\x00game_id\x00MINECRAFT\x00version\x001.8.8\x00plugins\x00CraftBukkit on Bukkit 1.8.8-R0.1-SNAPSHOT\x00map\x00world\x00numplayers\x000\x00maxplayers\x0020\x00hostport\x0025565\x00hostip\x00127.0.0.1\x00\x00\x01player_\x00\x00\x00";
        let packet = QueryPacket::from_bytes(bytes).unwrap();

        assert_eq!(packet.packet_type, QueryPacketType::FullResponse);
        assert_eq!(packet.request_id, 84_805_639);

        let QueryData::Full { stats, players } = packet.data else {
            panic!("expected full stats");
        };

        assert_eq!(stats["motd"], "A Minecraft Server");
        assert_eq!(stats["gametype"], "SMP");
        assert_eq!(stats["game_id"], "MINECRAFT");
        assert_eq!(stats["version"], "1.8.8");
        assert_eq!(stats["plugins"], "CraftBukkit on Bukkit 1.8.8-R0.1-SNAPSHOT");
        assert_eq!(stats["map"], "world");
        assert_eq!(stats["numplayers"], "0");
        assert_eq!(stats["maxplayers"], "20");
        assert_eq!(stats["hostport"], "25565");
        assert_eq!(stats["hostip"], "127.0.0.1");
        assert_eq!(stats.len(), 10);

        // An empty player section still yields one empty name.
        assert_eq!(players, vec![String::new()]);
    }

    #[test]
    fn test_decode_full_with_players() {
        let bytes = b"\x00\x05\x0e\x08\x07splitnum\x00\x80\x00hostname\x00Server\x00map\x00world\x00\x00\x01player_\x00\x00Notch\x00jeb_\x00\x00";
        let packet = QueryPacket::from_bytes(bytes).unwrap();

        let QueryData::Full { stats, players } = packet.data else {
            panic!("expected full stats");
        };

        assert_eq!(stats["motd"], "Server");
        assert_eq!(stats["map"], "world");
        assert_eq!(players, vec!["Notch".to_owned(), "jeb_".to_owned()]);
    }

    #[test]
    fn test_decode_bad_challenge() {
        assert!(QueryPacket::from_bytes(b"\x09\x00\x00\x00\x03not-a-number").is_err());
    }

    #[test]
    fn test_decode_truncated() {
        assert!(QueryPacket::from_bytes(b"\x09\x00").is_err());
    }
}
