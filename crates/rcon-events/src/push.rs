//! Classifier for unsolicited server-push lines.
//!
//! The push stream carries the server's chat and admin log. Each line is
//! tried against a fixed list of patterns in priority order; the first
//! match wins and produces at most one [`GameEvent`]. Lines that match
//! nothing are dropped.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::Identities;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static CHAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[(ChatAll|ChatTeam|ChatSquad|ChatAdmin)\] \[(Online IDs:[^\]]*|SteamID:\d{17})\] (.+?) : (.*)",
    )
    .expect("chat regex is valid")
});

static ADMIN_CAMERA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[(Online I[Dd]s:[^\]]*|SteamID:\d{17})\] (.+?) has (un)?possessed admin camera\.",
    )
    .expect("admin camera regex is valid")
});

static WARNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Remote admin has warned player (.*)\. Message was "(.*)""#)
        .expect("warn regex is valid")
});

static KICKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Kicked player (\d+)\. \[(Online IDs= [^\]]*|steamid=\d{17})\] (.*)")
        .expect("kick regex is valid")
});

static BANNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Banned player (\d+)\. \[steamid=(.*?)\] (.*) for interval (.*)")
        .expect("ban regex is valid")
});

static SQUAD_CREATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(.+) \((Online IDs: [^)]*|Steam ID: \d{17})\) has created Squad (\d+) \(Squad Name: (.+)\) on (.+)",
    )
    .expect("squad created regex is valid")
});

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// The chat channel a message was sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatChannel {
    /// Everyone on the server.
    ChatAll,
    /// The sender's team.
    ChatTeam,
    /// The sender's squad.
    ChatSquad,
    /// Admins only.
    ChatAdmin,
}

impl ChatChannel {
    /// The channel name exactly as the server prints it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatAll => "ChatAll",
            Self::ChatTeam => "ChatTeam",
            Self::ChatSquad => "ChatSquad",
            Self::ChatAdmin => "ChatAdmin",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ChatAll" => Some(Self::ChatAll),
            "ChatTeam" => Some(Self::ChatTeam),
            "ChatSquad" => Some(Self::ChatSquad),
            "ChatAdmin" => Some(Self::ChatAdmin),
            _ => None,
        }
    }
}

impl fmt::Display for ChatChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message from a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The line as received.
    pub raw: String,
    /// Channel the message was sent on.
    pub channel: ChatChannel,
    /// Platform ids of the sender.
    #[serde(flatten)]
    pub identities: Identities,
    /// Sender name.
    pub player_name: String,
    /// Message text.
    pub message: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// An admin entered or left the admin camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCamera {
    /// The line as received.
    pub raw: String,
    /// Platform ids of the player.
    #[serde(flatten)]
    pub identities: Identities,
    /// Admin name.
    pub player_name: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// An admin sent a player a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerWarned {
    /// The line as received.
    pub raw: String,
    /// Warned player.
    pub player_name: String,
    /// Warning text shown to the player.
    pub reason: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// A player was kicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerKicked {
    /// The line as received.
    pub raw: String,
    /// The in-game player slot id, not a platform id.
    pub player_id: u32,
    /// Platform ids of the player.
    #[serde(flatten)]
    pub identities: Identities,
    /// Kicked player.
    pub player_name: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// A player was banned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBanned {
    /// The line as received.
    pub raw: String,
    /// In-game player slot id.
    pub player_id: u32,
    /// Platform ids of the player.
    #[serde(flatten)]
    pub identities: Identities,
    /// Banned player.
    pub player_name: String,
    /// Ban length as printed, e.g. `0` for permanent or `1d`.
    pub interval: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// A player created a squad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadCreated {
    /// The line as received.
    pub raw: String,
    /// Squad leader name.
    pub player_name: String,
    /// Platform ids of the squad leader.
    #[serde(flatten)]
    pub identities: Identities,
    /// Squad number within the team.
    pub squad_id: u32,
    /// Squad name as chosen by the leader.
    pub squad_name: String,
    /// Team the squad belongs to.
    pub team_name: String,
    /// When the line was received.
    pub time: DateTime<Utc>,
}

/// One event recognised on the push stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Chat(ChatMessage),
    AdminCameraPossessed(AdminCamera),
    AdminCameraUnpossessed(AdminCamera),
    PlayerWarned(PlayerWarned),
    PlayerKicked(PlayerKicked),
    PlayerBanned(PlayerBanned),
    SquadCreated(SquadCreated),
}

impl GameEvent {
    /// The line this event was parsed from.
    pub fn raw(&self) -> &str {
        match self {
            Self::Chat(e) => &e.raw,
            Self::AdminCameraPossessed(e) | Self::AdminCameraUnpossessed(e) => &e.raw,
            Self::PlayerWarned(e) => &e.raw,
            Self::PlayerKicked(e) => &e.raw,
            Self::PlayerBanned(e) => &e.raw,
            Self::SquadCreated(e) => &e.raw,
        }
    }

    /// When the line was captured.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Chat(e) => e.time,
            Self::AdminCameraPossessed(e) | Self::AdminCameraUnpossessed(e) => e.time,
            Self::PlayerWarned(e) => e.time,
            Self::PlayerKicked(e) => e.time,
            Self::PlayerBanned(e) => e.time,
            Self::SquadCreated(e) => e.time,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classifies one push line, stamping it with the current time.
pub fn parse_push_line(line: &str) -> Option<GameEvent> {
    parse_push_line_at(line, Utc::now())
}

/// Classifies every line of a push frame body, in order.
pub fn parse_push_body(body: &str) -> Vec<GameEvent> {
    let time = Utc::now();
    body.lines()
        .filter_map(|line| parse_push_line_at(line, time))
        .collect()
}

/// Classifies one push line with an explicit capture time.
pub fn parse_push_line_at(line: &str, time: DateTime<Utc>) -> Option<GameEvent> {
    let raw = line.to_string();

    if let Some(c) = CHAT.captures(line) {
        let channel = ChatChannel::from_tag(&c[1])?;
        return Some(GameEvent::Chat(ChatMessage {
            raw,
            channel,
            identities: Identities::parse(&c[2]),
            player_name: c[3].to_string(),
            message: c[4].to_string(),
            time,
        }));
    }

    if let Some(c) = ADMIN_CAMERA.captures(line) {
        let event = AdminCamera {
            raw,
            identities: Identities::parse(&c[1]),
            player_name: c[2].to_string(),
            time,
        };
        return Some(if c.get(3).is_some() {
            GameEvent::AdminCameraUnpossessed(event)
        } else {
            GameEvent::AdminCameraPossessed(event)
        });
    }

    if let Some(c) = WARNED.captures(line) {
        return Some(GameEvent::PlayerWarned(PlayerWarned {
            raw,
            player_name: c[1].to_string(),
            reason: c[2].to_string(),
            time,
        }));
    }

    if let Some(c) = KICKED.captures(line) {
        return Some(GameEvent::PlayerKicked(PlayerKicked {
            raw,
            player_id: numeric_id(&c, 1)?,
            identities: Identities::parse(&c[2]),
            player_name: c[3].to_string(),
            time,
        }));
    }

    if let Some(c) = BANNED.captures(line) {
        let steam_id = &c[2];
        let identities = if steam_id.is_empty() {
            Identities::default()
        } else {
            Identities::steam(steam_id)
        };
        return Some(GameEvent::PlayerBanned(PlayerBanned {
            raw,
            player_id: numeric_id(&c, 1)?,
            identities,
            player_name: c[3].to_string(),
            interval: c[4].to_string(),
            time,
        }));
    }

    if let Some(c) = SQUAD_CREATED.captures(line) {
        return Some(GameEvent::SquadCreated(SquadCreated {
            raw,
            player_name: c[1].to_string(),
            identities: Identities::parse(&c[2]),
            squad_id: numeric_id(&c, 3)?,
            squad_name: c[4].to_string(),
            team_name: c[5].to_string(),
            time,
        }));
    }

    None
}

fn numeric_id(c: &Captures<'_>, group: usize) -> Option<u32> {
    match c[group].parse() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::debug!(value = &c[group], "numeric id out of range");
            None
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EOS: &str = "0002a1b2c3d4e5f60718293a4b5c6d7e";
    const STEAM: &str = "76561197960287930";

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    fn parse(line: &str) -> GameEvent {
        parse_push_line_at(line, at()).expect("line should be recognised")
    }

    // =====================================================================
    // Chat
    // =====================================================================

    #[test]
    fn test_chat_legacy_steam_id() {
        let line = "[ChatAll] [SteamID:76561197960287930] PlayerOne : hello world";
        let GameEvent::Chat(chat) = parse(line) else {
            panic!("expected chat");
        };
        assert_eq!(chat.channel, ChatChannel::ChatAll);
        assert_eq!(chat.channel.as_str(), "ChatAll");
        assert_eq!(chat.identities.steam_id.as_deref(), Some(STEAM));
        assert_eq!(chat.player_name, "PlayerOne");
        assert_eq!(chat.message, "hello world");
        assert_eq!(chat.raw, line);
        assert_eq!(chat.time, at());
    }

    #[test]
    fn test_chat_online_ids() {
        let line = format!("[ChatSquad] [Online IDs:EOS: {EOS} steam: {STEAM}] Some Name : need ammo");
        let GameEvent::Chat(chat) = parse(&line) else {
            panic!("expected chat");
        };
        assert_eq!(chat.channel, ChatChannel::ChatSquad);
        assert_eq!(chat.identities.eos_id.as_deref(), Some(EOS));
        assert_eq!(chat.identities.steam_id.as_deref(), Some(STEAM));
        assert_eq!(chat.player_name, "Some Name");
        assert_eq!(chat.message, "need ammo");
    }

    #[test]
    fn test_chat_message_may_contain_separator() {
        let line = "[ChatTeam] [SteamID:76561197960287930] A : b : c";
        let GameEvent::Chat(chat) = parse(line) else {
            panic!("expected chat");
        };
        assert_eq!(chat.player_name, "A");
        assert_eq!(chat.message, "b : c");
    }

    // =====================================================================
    // Admin camera
    // =====================================================================

    #[test]
    fn test_admin_camera_possessed_and_unpossessed() {
        let on = format!("[Online Ids:EOS: {EOS} steam: {STEAM}] Admin has possessed admin camera.");
        let off = format!("[Online IDs:EOS: {EOS} steam: {STEAM}] Admin has unpossessed admin camera.");

        let GameEvent::AdminCameraPossessed(e) = parse(&on) else {
            panic!("expected possessed");
        };
        assert_eq!(e.player_name, "Admin");
        assert_eq!(e.identities.eos_id.as_deref(), Some(EOS));

        assert!(matches!(parse(&off), GameEvent::AdminCameraUnpossessed(_)));
    }

    #[test]
    fn test_admin_camera_legacy_steam_id() {
        let line = "[SteamID:76561197960287930] Admin has possessed admin camera.";
        let GameEvent::AdminCameraPossessed(e) = parse(line) else {
            panic!("expected possessed");
        };
        assert_eq!(e.identities, Identities::steam(STEAM));
    }

    // =====================================================================
    // Warn / kick / ban
    // =====================================================================

    #[test]
    fn test_warned() {
        let line = r#"Remote admin has warned player Bob. Message was "stop teamkilling""#;
        let GameEvent::PlayerWarned(e) = parse(line) else {
            panic!("expected warn");
        };
        assert_eq!(e.player_name, "Bob");
        assert_eq!(e.reason, "stop teamkilling");
    }

    #[test]
    fn test_kicked_online_ids() {
        let line = format!("Kicked player 12. [Online IDs= EOS: {EOS} steam: {STEAM}] Bob");
        let GameEvent::PlayerKicked(e) = parse(&line) else {
            panic!("expected kick");
        };
        assert_eq!(e.player_id, 12);
        assert_eq!(e.identities.eos_id.as_deref(), Some(EOS));
        assert_eq!(e.identities.steam_id.as_deref(), Some(STEAM));
        assert_eq!(e.player_name, "Bob");
    }

    #[test]
    fn test_kicked_legacy_steam_id() {
        let line = "Kicked player 3. [steamid=76561197960287930] Bob";
        let GameEvent::PlayerKicked(e) = parse(line) else {
            panic!("expected kick");
        };
        assert_eq!(e.identities, Identities::steam(STEAM));
    }

    #[test]
    fn test_banned() {
        let line = "Banned player 7. [steamid=76561197960287930] Bob for interval 1d";
        let GameEvent::PlayerBanned(e) = parse(line) else {
            panic!("expected ban");
        };
        assert_eq!(e.player_id, 7);
        assert_eq!(e.identities, Identities::steam(STEAM));
        assert_eq!(e.player_name, "Bob");
        assert_eq!(e.interval, "1d");
    }

    // =====================================================================
    // Squad created
    // =====================================================================

    #[test]
    fn test_squad_created_online_ids() {
        let line = format!(
            "Bob (Online IDs: EOS: {EOS} steam: {STEAM}) has created Squad 4 (Squad Name: ARMOR) on United States Army"
        );
        let GameEvent::SquadCreated(e) = parse(&line) else {
            panic!("expected squad created");
        };
        assert_eq!(e.player_name, "Bob");
        assert_eq!(e.identities.eos_id.as_deref(), Some(EOS));
        assert_eq!(e.squad_id, 4);
        assert_eq!(e.squad_name, "ARMOR");
        assert_eq!(e.team_name, "United States Army");
    }

    #[test]
    fn test_squad_created_legacy_steam_id() {
        let line = "Bob (Steam ID: 76561197960287930) has created Squad 1 (Squad Name: INF) on Militia";
        let GameEvent::SquadCreated(e) = parse(line) else {
            panic!("expected squad created");
        };
        assert_eq!(e.identities, Identities::steam(STEAM));
    }

    // =====================================================================
    // Priority and noise
    // =====================================================================

    #[test]
    fn test_chat_wins_over_later_patterns() {
        // A chat message quoting a kick line is still a chat message.
        let line = "[ChatAll] [SteamID:76561197960287930] Troll : Kicked player 1. [steamid=76561197960287930] X";
        assert!(matches!(parse(line), GameEvent::Chat(_)));
    }

    #[test]
    fn test_unrecognised_line_is_ignored() {
        assert!(parse_push_line("LogSquad: some server noise").is_none());
        assert!(parse_push_line("").is_none());
    }

    #[test]
    fn test_parse_push_body_splits_lines() {
        let body = "noise\n[ChatAll] [SteamID:76561197960287930] A : hi\nKicked player 2. [steamid=76561197960287930] B\n";
        let events = parse_push_body(body);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], GameEvent::Chat(_)));
        assert!(matches!(events[1], GameEvent::PlayerKicked(_)));
    }

    #[test]
    fn test_game_event_serializes_with_type_tag() {
        let line = "[ChatAll] [SteamID:76561197960287930] A : hi";
        let json = serde_json::to_value(parse(line)).expect("serializes");
        assert_eq!(json["type"], "chat");
        assert_eq!(json["channel"], "ChatAll");
        assert_eq!(json["steam_id"], STEAM);
        assert_eq!(json["player_name"], "A");
    }
}
