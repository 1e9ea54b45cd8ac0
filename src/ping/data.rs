//! Typed view of the status response JSON.
//!
//! Servers deviate from the published shape freely, so only the fields
//! that are reliably present are typed; the motd stays a raw JSON tree
//! (it is either a plain string or a chat-component object) and unknown
//! fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status information a server advertises to the multiplayer screen.
///
/// Represents the [status response JSON](https://wiki.vg/Server_List_Ping#Status_Response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Game and protocol version information.
    pub version: Version,

    /// Player counts and an optional sample of who is online.
    pub players: Players,

    /// The "motd" shown in the server list. Either a plain string or a
    /// chat-component tree; [`crate::format::Formatter::chat_text`]
    /// flattens it.
    #[serde(rename = "description")]
    pub motd: Value,

    /// Base64 `data:` URI of the server's icon.
    pub favicon: Option<String>,

    /// Whether the server requires signed chat (1.19.1+).
    #[serde(rename = "enforcesSecureChat")]
    pub enforces_secure_chat: Option<bool>,

    /// Whether the server previews chat.
    #[serde(rename = "previewsChat")]
    pub previews_chat: Option<bool>,
}

impl StatusResponse {
    /// Deserialize a status response from the decoded JSON tree.
    ///
    /// # Errors
    /// Returns the underlying `serde_json` error if required fields are
    /// missing or of the wrong shape.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Version block of a status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// Human-readable version, e.g. `1.8.8` or a modpack banner.
    pub name: String,

    /// [Protocol version number](https://wiki.vg/Protocol_version_numbers).
    pub protocol: i64,
}

/// Player block of a status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Players {
    /// Maximum number of players allowed.
    pub max: i64,

    /// Number of players currently online.
    pub online: i64,

    /// A sample of online players. Some servers abuse this field for
    /// extra message lines.
    pub sample: Option<Vec<Sample>>,
}

/// One entry in the player sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// The player's username.
    pub name: String,

    /// The player's UUID.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::StatusResponse;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let value = json!({
            "description": "A Minecraft Server",
            "players": {"max": 20, "online": 1, "sample": [{"name": "Notch", "id": "uuid"}]},
            "version": {"name": "PaperSpigot 1.8.8", "protocol": 47},
            "favicon": "data:image/png;base64,...",
        });

        let status = StatusResponse::from_value(value).unwrap();

        assert_eq!(status.version.protocol, 47);
        assert_eq!(status.players.online, 1);
        assert_eq!(status.players.sample.unwrap()[0].name, "Notch");
        assert_eq!(status.motd, json!("A Minecraft Server"));
    }

    #[test]
    fn test_missing_optional_fields() {
        let value = json!({
            "description": {"text": "hi"},
            "players": {"max": 20, "online": 0},
            "version": {"name": "1.20", "protocol": 763},
        });

        let status = StatusResponse::from_value(value).unwrap();

        assert!(status.favicon.is_none());
        assert!(status.players.sample.is_none());
    }
}
