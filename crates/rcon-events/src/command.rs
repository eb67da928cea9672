//! Parsers for structured command output.
//!
//! Each parser takes the fully reassembled response body of one command.
//! The line-oriented parsers are tolerant: lines that don't fit the
//! expected grammar (headers, blank lines, the "recently disconnected"
//! section) are skipped.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Identities, ParseError};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static PLAYER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"ID: (\d+) \| (SteamID: \d{17}|Online IDs:[^|]*) \| Name: (.+) \| Team ID: (\d+) \| Squad ID: (\d+|N/A) \| Is Leader: (True|False) \| Role: ([A-Za-z0-9_]*)\b",
    )
    .expect("player regex is valid")
});

static SQUAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"ID: (\d+) \| Name: (.+) \| Size: (\d+) \| Locked: (True|False) \| Creator Name: (.+) \| Creator (Online IDs: .*|Steam ID: \d{17})",
    )
    .expect("squad regex is valid")
});

static TEAM_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Team ID: (\d+) \((.+)\)").expect("team header regex is valid"));

static CURRENT_MAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Current level is (.*), layer is (.*)").expect("current map regex is valid")
});

static NEXT_MAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Next level is (.*), layer is (.*)").expect("next map regex is valid")
});

/// Placeholder the server prints when the next layer hasn't been chosen.
const UNDECIDED_LAYER: &str = "To be voted";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One connected player from `ListPlayers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// In-game player slot id.
    pub id: u32,
    #[serde(flatten)]
    pub identities: Identities,
    pub name: String,
    pub team_id: u32,
    /// `None` when the player isn't in a squad.
    pub squad_id: Option<u32>,
    pub is_leader: bool,
    pub role: String,
}

/// One squad from `ListSquads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    /// Squad id, unique per team only.
    pub id: u32,
    pub name: String,
    pub size: u32,
    pub locked: bool,
    pub creator_name: String,
    pub creator: Identities,
    /// The team from the most recent header line, if any preceded it.
    pub team_id: Option<u32>,
    pub team_name: Option<String>,
}

/// Current or next level and layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub level: Option<String>,
    pub layer: Option<String>,
}

/// Output of `ShowServerInfo`. Missing fields default to zero or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub max_players: u32,
    pub public_queue_limit: u32,
    pub reserve_slots: u32,
    pub player_count: u32,
    pub public_queue: u32,
    pub reserve_queue: u32,
    pub current_layer: String,
    pub next_layer: String,
    /// Team names with the map name removed.
    pub team_one: String,
    pub team_two: String,
    pub match_timeout: u64,
    pub match_start_time: u64,
    pub game_version: String,
}

/// The parsed output of a command that has a structured parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandOutput {
    Players(Vec<Player>),
    Squads(Vec<Squad>),
    CurrentMap(MapInfo),
    NextMap(MapInfo),
    ServerInfo(ServerInfo),
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Parses `body` with the parser for `command`.
///
/// Returns `Ok(None)` for commands without a structured parser.
///
/// # Errors
/// Returns [`ParseError::ServerInfo`] if `ShowServerInfo` output isn't
/// valid JSON.
pub fn parse_command_output(command: &str, body: &str) -> Result<Option<CommandOutput>, ParseError> {
    let name = command.trim();
    let is = |expected: &str| name.eq_ignore_ascii_case(expected);

    let output = if is("ListPlayers") {
        CommandOutput::Players(parse_list_players(body))
    } else if is("ListSquads") {
        CommandOutput::Squads(parse_list_squads(body))
    } else if is("ShowCurrentMap") {
        CommandOutput::CurrentMap(parse_current_map(body))
    } else if is("ShowNextMap") {
        CommandOutput::NextMap(parse_next_map(body))
    } else if is("ShowServerInfo") {
        CommandOutput::ServerInfo(parse_server_info(body)?)
    } else {
        return Ok(None);
    };
    Ok(Some(output))
}

// ---------------------------------------------------------------------------
// Players and squads
// ---------------------------------------------------------------------------

/// Parses `ListPlayers` output.
pub fn parse_list_players(body: &str) -> Vec<Player> {
    body.lines()
        .filter_map(|line| {
            let c = PLAYER.captures(line)?;
            Some(Player {
                id: c[1].parse().ok()?,
                identities: Identities::parse(&c[2]),
                name: c[3].to_string(),
                team_id: c[4].parse().ok()?,
                squad_id: c[5].parse().ok(),
                is_leader: &c[6] == "True",
                role: c[7].to_string(),
            })
        })
        .collect()
}

/// Parses `ListSquads` output.
///
/// Squads are listed under `Team ID: N (Name)` headers; each squad takes
/// the team of the header above it.
pub fn parse_list_squads(body: &str) -> Vec<Squad> {
    let mut team_id: Option<u32> = None;
    let mut team_name: Option<String> = None;
    let mut squads = Vec::new();

    for line in body.lines() {
        if let Some(c) = SQUAD.captures(line) {
            let (Ok(id), Ok(size)) = (c[1].parse(), c[3].parse()) else {
                continue;
            };
            squads.push(Squad {
                id,
                name: c[2].to_string(),
                size,
                locked: &c[4] == "True",
                creator_name: c[5].to_string(),
                creator: Identities::parse(&c[6]),
                team_id,
                team_name: team_name.clone(),
            });
        } else if let Some(c) = TEAM_HEADER.captures(line) {
            team_id = c[1].parse().ok();
            team_name = Some(c[2].to_string());
        }
    }

    squads
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// Parses `ShowCurrentMap` output.
pub fn parse_current_map(body: &str) -> MapInfo {
    parse_map(&CURRENT_MAP, body)
}

/// Parses `ShowNextMap` output. An undecided next layer is `None`.
pub fn parse_next_map(body: &str) -> MapInfo {
    parse_map(&NEXT_MAP, body)
}

fn parse_map(re: &Regex, body: &str) -> MapInfo {
    let Some(c) = re.captures(body.trim()) else {
        return MapInfo::default();
    };
    let present = |s: &str| {
        let s = s.trim();
        (!s.is_empty() && s != UNDECIDED_LAYER).then(|| s.to_string())
    };
    MapInfo {
        level: present(&c[1]),
        layer: present(&c[2]),
    }
}

// ---------------------------------------------------------------------------
// Server info
// ---------------------------------------------------------------------------

/// Parses the JSON body of `ShowServerInfo`.
///
/// # Errors
/// Returns [`ParseError::ServerInfo`] for malformed JSON. An empty body
/// is not an error and yields the default record.
pub fn parse_server_info(body: &str) -> Result<ServerInfo, ParseError> {
    if body.trim().is_empty() {
        return Ok(ServerInfo::default());
    }
    let json: Value = serde_json::from_str(body)?;

    let current_layer = string_field(&json, "MapName_s");
    let team_one = strip_map_name(&string_field(&json, "TeamOne_s"), &current_layer);
    let team_two = strip_map_name(&string_field(&json, "TeamTwo_s"), &current_layer);

    Ok(ServerInfo {
        server_name: string_field(&json, "ServerName_s"),
        max_players: count_field(&json, "MaxPlayers"),
        public_queue_limit: count_field(&json, "PublicQueueLimit_I"),
        reserve_slots: count_field(&json, "PlayerReserveCount_I"),
        player_count: count_field(&json, "PlayerCount_I"),
        public_queue: count_field(&json, "PublicQueue_I"),
        reserve_queue: count_field(&json, "ReservedQueue_I"),
        next_layer: string_field(&json, "NextLayer_s"),
        team_one,
        team_two,
        match_timeout: number_field(&json, "MatchTimeout_d"),
        match_start_time: number_field(&json, "PLAYTIME_I"),
        game_version: string_field(&json, "GameVersion_s"),
        current_layer,
    })
}

fn string_field(json: &Value, key: &str) -> String {
    match json.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Reads a non-negative integer that may be sent as a number or a numeric
/// string. Fractions truncate; anything unreadable is zero.
fn number_field(json: &Value, key: &str) -> u64 {
    match json.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => leading_digits(s),
        _ => 0,
    }
}

fn count_field(json: &Value, key: &str) -> u32 {
    u32::try_from(number_field(json, key)).unwrap_or(u32::MAX)
}

fn leading_digits(s: &str) -> u64 {
    let s = s.trim();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}

fn strip_map_name(team: &str, map: &str) -> String {
    if map.is_empty() {
        return team.to_string();
    }
    let Ok(re) = RegexBuilder::new(&regex::escape(map))
        .case_insensitive(true)
        .build()
    else {
        return team.to_string();
    };
    re.replace(team, "").into_owned()
}

// =========================================================================
// Tests
// =========================================================================
