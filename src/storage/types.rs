//! Persistent record types for players, runs, owned items and the coin ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::PlatformUser;

/// Current on-disk schema version for [`PlayerRecord`].
pub const PLAYER_SCHEMA_VERSION: u8 = 1;

/// Item id granted for free to every new player, for both kinds.
pub const DEFAULT_ITEM_ID: &str = "default";

/// Platform user id (the chat platform's numeric user id).
pub type PlayerId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub platform_id: PlayerId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: bool,
    pub games_played: u64,
    pub high_score: u64,
    pub total_coins: u64,
    pub total_beans: u64,
    pub total_distance: u64,
    pub selected_character: String,
    pub selected_skin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl PlayerRecord {
    /// Fresh player with an empty wallet and the default loadout selected.
    pub fn new(user: &PlatformUser) -> Self {
        let now = Utc::now();
        Self {
            platform_id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            language_code: user.language_code.clone(),
            is_premium: user.is_premium,
            games_played: 0,
            high_score: 0,
            total_coins: 0,
            total_beans: 0,
            total_distance: 0,
            selected_character: DEFAULT_ITEM_ID.to_string(),
            selected_skin: DEFAULT_ITEM_ID.to_string(),
            created_at: now,
            updated_at: now,
            last_played_at: None,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    /// Copy display metadata from a freshly verified platform user.
    pub fn refresh_profile(&mut self, user: &PlatformUser) {
        self.username = user.username.clone();
        self.first_name = user.first_name.clone();
        self.last_name = user.last_name.clone();
        self.language_code = user.language_code.clone();
        self.is_premium = user.is_premium;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Immutable record of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSession {
    pub id: u64,
    pub platform_id: PlayerId,
    pub score: u64,
    pub coins_collected: u64,
    pub beans_collected: u64,
    pub distance: u64,
    pub max_multiplier: u32,
    pub duration_seconds: u32,
    pub character_used: Option<String>,
    pub skin_used: Option<String>,
    pub played_at: DateTime<Utc>,
}

/// A run as reported by the client, before it is assigned an id and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionReport {
    pub score: u64,
    pub coins_collected: u64,
    pub beans_collected: u64,
    pub distance: u64,
    pub max_multiplier: u32,
    pub duration_seconds: u32,
    pub character: Option<String>,
    pub skin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Character,
    Skin,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Character => "character",
            ItemKind::Skin => "skin",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            ItemKind::Character => b'c',
            ItemKind::Skin => b's',
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "character" => Ok(ItemKind::Character),
            "skin" => Ok(ItemKind::Skin),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnedItem {
    pub kind: ItemKind,
    pub item_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// Owned items grouped the way the client renders them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedItems {
    pub characters: Vec<String>,
    pub skins: Vec<String>,
}

impl OwnedItems {
    pub fn contains(&self, kind: ItemKind, item_id: &str) -> bool {
        let list = match kind {
            ItemKind::Character => &self.characters,
            ItemKind::Skin => &self.skins,
        };
        list.iter().any(|id| id == item_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Purchase,
    SessionReward,
}

/// Append-only audit record of a balance change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: u64,
    pub platform_id: PlayerId,
    pub kind: EntryKind,
    pub delta: i64,
    pub currency: Currency,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSummary {
    pub platform_id: PlayerId,
    pub username: Option<String>,
    pub first_name: String,
    pub high_score: u64,
    pub total_coins: u64,
    pub total_beans: u64,
}

impl From<&PlayerRecord> for PlayerSummary {
    fn from(p: &PlayerRecord) -> Self {
        Self {
            platform_id: p.platform_id,
            username: p.username.clone(),
            first_name: p.first_name.clone(),
            high_score: p.high_score,
            total_coins: p.total_coins,
            total_beans: p.total_beans,
        }
    }
}

/// Best individual run joined with the runner's display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopSession {
    #[serde(flatten)]
    pub session: GameSession,
    pub username: Option<String>,
    pub first_name: String,
}

/// Aggregates over all of a player's runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub total_games: u64,
    pub total_score: u64,
    pub best_score: u64,
    pub total_coins_collected: u64,
    pub total_beans_collected: u64,
    pub total_distance: u64,
    pub avg_score: f64,
    pub best_multiplier: u32,
}

impl SessionStats {
    pub fn accumulate(&mut self, session: &GameSession) {
        self.total_games += 1;
        self.total_score = self.total_score.saturating_add(session.score);
        self.best_score = self.best_score.max(session.score);
        self.total_coins_collected = self
            .total_coins_collected
            .saturating_add(session.coins_collected);
        self.total_beans_collected = self
            .total_beans_collected
            .saturating_add(session.beans_collected);
        self.total_distance = self.total_distance.saturating_add(session.distance);
        self.best_multiplier = self.best_multiplier.max(session.max_multiplier);
        self.avg_score = self.total_score as f64 / self.total_games as f64;
    }
}
