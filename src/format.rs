//! Post-processing of decoded payloads.
//!
//! Minecraft servers embed formatting codes (`§` followed by a code
//! character) in most of the text they return. This module is the seam
//! between the protocol clients and whatever presentation layer consumes
//! them: a [`FormatMode`] selects what happens to those codes, and a
//! [`Formatter`] is the pluggable hook that does the work. The built-in
//! [`DefaultFormatter`] translates codes to ANSI escapes or strips them.

use serde_json::Value;
use std::collections::HashMap;

/// The character prefixing every Minecraft formatting code.
pub const FORMAT_CHAR: char = '\u{00a7}';

/// ANSI reset, appended after replaced output so later terminal text is
/// unaffected.
const RESET: &str = "\x1b[0m";

/// Context tag passed to the formatting hook for Query responses.
pub const QUERY_CONTEXT: &str = "query";

/// Context tag passed to the formatting hook for Server List Ping
/// responses.
pub const PING_CONTEXT: &str = "ping";

/// What to do with formatting codes in decoded payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    /// Leave payloads untouched.
    Raw,

    /// Replace formatting codes with ANSI escape sequences.
    #[default]
    Replace,

    /// Strip formatting codes entirely.
    Remove,
}

/// ANSI escape for a Minecraft formatting code character.
///
/// Color codes carry a leading reset, matching how Java edition treats a
/// color change as a full style reset.
fn ansi_for(code: char) -> Option<&'static str> {
    match code {
        '0' => Some("\x1b[0m\x1b[30m"),
        '1' => Some("\x1b[0m\x1b[34m"),
        '2' => Some("\x1b[0m\x1b[32m"),
        '3' => Some("\x1b[0m\x1b[36m"),
        '4' => Some("\x1b[0m\x1b[31m"),
        '5' => Some("\x1b[0m\x1b[35m"),
        '6' => Some("\x1b[0m\x1b[33m"),
        '7' => Some("\x1b[0m\x1b[38;5;246m"),
        '8' => Some("\x1b[0m\x1b[38;5;243m"),
        '9' => Some("\x1b[0m\x1b[34;1m"),
        'a' => Some("\x1b[0m\x1b[32;1m"),
        'b' => Some("\x1b[0m\x1b[36;1m"),
        'c' => Some("\x1b[0m\x1b[31;1m"),
        'd' => Some("\x1b[0m\x1b[35;1m"),
        'e' => Some("\x1b[0m\x1b[33;1m"),
        'f' => Some("\x1b[0m\x1b[37;1m"),
        'k' => Some("\x1b[5m"),
        'l' => Some("\x1b[1m"),
        'm' => Some("\x1b[9m"),
        'n' => Some("\x1b[4m"),
        'o' => Some("\x1b[3m"),
        'r' => Some(RESET),
        _ => None,
    }
}

/// Formatting code character for a chat-component color or style name.
fn code_for_name(name: &str) -> Option<char> {
    match name {
        "black" => Some('0'),
        "dark_blue" => Some('1'),
        "dark_green" => Some('2'),
        "dark_aqua" => Some('3'),
        "dark_red" => Some('4'),
        "dark_purple" => Some('5'),
        "gold" => Some('6'),
        "gray" => Some('7'),
        "dark_gray" => Some('8'),
        "blue" => Some('9'),
        "green" => Some('a'),
        "aqua" => Some('b'),
        "red" => Some('c'),
        "light_purple" => Some('d'),
        "yellow" => Some('e'),
        "white" => Some('f'),
        "obfuscated" => Some('k'),
        "bold" => Some('l'),
        "strikethrough" => Some('m'),
        "underlined" => Some('n'),
        "italic" => Some('o'),
        _ => None,
    }
}

/// The pluggable post-processing hook.
///
/// Clients call the `apply_*` methods with their decoded payload and a
/// command-context tag (the issued command for RCON, [`QUERY_CONTEXT`] or
/// [`PING_CONTEXT`] otherwise). Implement [`replace`](Formatter::replace)
/// and [`remove`](Formatter::remove) to customize what happens to text;
/// the shape-preserving walks over stat maps and status trees are provided
/// as default methods.
pub trait Formatter: Send + Sync {
    /// Replace formatting codes in `text` with presentation values.
    fn replace(&self, text: &str, context: &str) -> String;

    /// Strip formatting codes from `text`.
    fn remove(&self, text: &str, context: &str) -> String;

    /// Transform `text` according to `mode`.
    fn apply(&self, text: &str, mode: FormatMode, context: &str) -> String {
        match mode {
            FormatMode::Raw => text.to_owned(),
            FormatMode::Replace => self.replace(text, context),
            FormatMode::Remove => self.remove(text, context),
        }
    }

    /// Transform a Query stats map (and player list, when present) in
    /// place. Only the `motd` value and player names carry formatting
    /// codes in practice.
    fn apply_stats(
        &self,
        stats: &mut HashMap<String, String>,
        players: Option<&mut Vec<String>>,
        mode: FormatMode,
        context: &str,
    ) {
        if mode == FormatMode::Raw {
            return;
        }

        if let Some(motd) = stats.get_mut("motd") {
            *motd = self.apply(motd, mode, context);
        }

        if let Some(players) = players {
            for player in players.iter_mut() {
                *player = self.apply(player, mode, context);
            }
        }
    }

    /// Transform a Server List Ping status tree in place.
    ///
    /// The `description` field is flattened to a single string (servers
    /// send either a plain string or a chat-component tree), and player
    /// sample names are transformed where present.
    fn apply_status(&self, status: &mut Value, mode: FormatMode, context: &str) {
        if mode == FormatMode::Raw {
            return;
        }

        if let Some(description) = status.get_mut("description") {
            *description = Value::String(self.chat_text(description, mode, context));
        }

        let sample = status
            .get_mut("players")
            .and_then(|players| players.get_mut("sample"))
            .and_then(Value::as_array_mut);

        if let Some(sample) = sample {
            for entry in sample {
                if let Some(name) = entry.get_mut("name") {
                    if let Some(text) = name.as_str() {
                        *name = Value::String(self.apply(text, mode, context));
                    }
                }
            }
        }
    }

    /// Flatten a chat component (string, array, or object form) into one
    /// transformed string.
    fn chat_text(&self, chat: &Value, mode: FormatMode, context: &str) -> String {
        match chat {
            Value::String(text) => self.apply(text, mode, context),
            Value::Array(parts) => parts
                .iter()
                .map(|part| self.chat_text(part, mode, context))
                .collect(),
            Value::Object(_) => match mode {
                FormatMode::Replace => {
                    flatten_chat(chat, "", "", &|text| self.replace(text, context))
                }
                _ => {
                    let plain = plain_chat(chat);
                    self.apply(&plain, mode, context)
                }
            },
            _ => String::new(),
        }
    }
}

/// Walk a chat-component object, turning color/style flags into ANSI
/// escapes. Children inherit the parent's color and attributes.
fn flatten_chat(chat: &Value, color: &str, attrib: &str, text_fn: &dyn Fn(&str) -> String) -> String {
    let Some(object) = chat.as_object() else {
        return match chat {
            Value::String(text) => text_fn(text),
            _ => String::new(),
        };
    };

    let mut color = color.to_owned();
    let mut attrib = attrib.to_owned();

    for (key, value) in object {
        if key.as_str() == "color" {
            if let Some(ansi) = value.as_str().and_then(code_for_name).and_then(ansi_for) {
                color = ansi.to_owned();
            }
        } else if let Some(ansi) = code_for_name(key).and_then(ansi_for) {
            // A style flag: true adds it, an explicit false removes an
            // inherited one.
            if value.as_bool() == Some(true) {
                attrib = format!("{ansi}{attrib}");
            } else {
                attrib = attrib.replace(ansi, "");
            }
        }
    }

    let text = object.get("text").and_then(Value::as_str).unwrap_or("");

    let mut extra = String::new();
    if let Some(children) = object.get("extra").and_then(Value::as_array) {
        for child in children {
            extra.push_str(&flatten_chat(child, &color, &attrib, text_fn));
        }
    }

    format!("{RESET}{color}{attrib}{}{extra}", text_fn(text))
}

/// Collect the raw text of a chat-component tree, no styling.
fn plain_chat(chat: &Value) -> String {
    match chat {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(plain_chat).collect(),
        Value::Object(object) => {
            let mut out = object
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();

            if let Some(children) = object.get("extra").and_then(Value::as_array) {
                for child in children {
                    out.push_str(&plain_chat(child));
                }
            }

            out
        }
        _ => String::new(),
    }
}

/// Translates `§` codes to ANSI escape sequences, or strips them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn replace(&self, text: &str, _context: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();

        while let Some(current) = chars.next() {
            if current == FORMAT_CHAR {
                if let Some(ansi) = chars.peek().copied().and_then(ansi_for) {
                    out.push_str(ansi);
                    chars.next();
                    continue;
                }
            }

            out.push(current);
        }

        // Trailing reset so the terminal state does not leak.
        out.push_str(RESET);
        out
    }

    fn remove(&self, text: &str, _context: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();

        while let Some(current) = chars.next() {
            if current == FORMAT_CHAR {
                if chars.peek().copied().and_then(ansi_for).is_some() {
                    chars.next();
                    continue;
                }
            }

            out.push(current);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DefaultFormatter, FormatMode, Formatter, PING_CONTEXT, QUERY_CONTEXT};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_replace_codes() {
        let formatter = DefaultFormatter;
        let out = formatter.replace("\u{a7}aHello\u{a7}r", "test");

        assert_eq!(out, "\x1b[0m\x1b[32;1mHello\x1b[0m\x1b[0m");
    }

    #[test]
    fn test_remove_codes() {
        let formatter = DefaultFormatter;

        assert_eq!(formatter.remove("\u{a7}lBold\u{a7}r text", "test"), "Bold text");
    }

    #[test]
    fn test_unknown_code_preserved() {
        let formatter = DefaultFormatter;

        assert_eq!(formatter.remove("price \u{a7}z100", "test"), "price \u{a7}z100");
    }

    #[test]
    fn test_raw_leaves_map_alone() {
        let formatter = DefaultFormatter;
        let mut stats = HashMap::from([("motd".to_owned(), "\u{a7}cred".to_owned())]);

        formatter.apply_stats(&mut stats, None, FormatMode::Raw, QUERY_CONTEXT);
        assert_eq!(stats["motd"], "\u{a7}cred");
    }

    #[test]
    fn test_stats_motd_cleaned() {
        let formatter = DefaultFormatter;
        let mut stats = HashMap::from([("motd".to_owned(), "\u{a7}cA Server".to_owned())]);
        let mut players = vec!["\u{a7}bNotch".to_owned()];

        formatter.apply_stats(
            &mut stats,
            Some(&mut players),
            FormatMode::Remove,
            QUERY_CONTEXT,
        );

        assert_eq!(stats["motd"], "A Server");
        assert_eq!(players, vec!["Notch".to_owned()]);
    }

    #[test]
    fn test_status_description_object_flattened() {
        let formatter = DefaultFormatter;
        let mut status = json!({
            "description": {
                "text": "Hello",
                "extra": [{"text": " world", "bold": true}],
            },
            "players": {"max": 20, "online": 0},
        });

        formatter.apply_status(&mut status, FormatMode::Remove, PING_CONTEXT);
        assert_eq!(status["description"], json!("Hello world"));
    }

    #[test]
    fn test_status_sample_names() {
        let formatter = DefaultFormatter;
        let mut status = json!({
            "description": "A Minecraft Server",
            "players": {
                "max": 20,
                "online": 1,
                "sample": [{"name": "\u{a7}6Admin", "id": "some-uuid"}],
            },
        });

        formatter.apply_status(&mut status, FormatMode::Remove, PING_CONTEXT);
        assert_eq!(status["players"]["sample"][0]["name"], json!("Admin"));
    }
}
