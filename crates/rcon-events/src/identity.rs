//! Player identities as they appear in server text.
//!
//! Over the game's lifetime the server has printed identities in several
//! shapes:
//!
//! ```text
//! [SteamID:76561197960287930]
//! [Online IDs:EOS: 0002a1b2c3d4e5f60718293a4b5c6d7e steam: 76561197960287930]
//! [Online IDs= EOS: 0002a1b2... steam: 76561197960287930]
//! [steamid=76561197960287930]
//! (Steam ID: 76561197960287930)
//! ```
//!
//! Rather than one pattern per shape, [`Identities::parse`] pulls the EOS
//! and Steam ids out of whatever segment it is handed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EOS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)eos\s*[:=]\s*([0-9a-f]{32})").expect("valid regex"));

static STEAM_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)steam\s*(?:id)?\s*[:=]\s*(\d{17})").expect("valid regex")
});

/// The platform ids of one player. Either may be missing depending on the
/// server version and the player's platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identities {
    /// 32-character lowercase hex Epic Online Services id.
    pub eos_id: Option<String>,
    /// 17-digit SteamID64.
    pub steam_id: Option<String>,
}

impl Identities {
    /// Extracts whichever ids are present in `segment`.
    pub fn parse(segment: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(segment)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };
        Self {
            eos_id: capture(&EOS_ID),
            steam_id: capture(&STEAM_ID),
        }
    }

    /// Identities with only a Steam id.
    pub fn steam(steam_id: impl Into<String>) -> Self {
        Self {
            eos_id: None,
            steam_id: Some(steam_id.into()),
        }
    }

    /// Returns `true` if neither id is known.
    pub fn is_empty(&self) -> bool {
        self.eos_id.is_none() && self.steam_id.is_none()
    }
}
