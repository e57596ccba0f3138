//! Identifiers, options, and the broadcast view of a session.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Client-chosen player identifier.
///
/// Serialized as a bare string (`"p1"`, not `{"0":"p1"}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one game session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who an outbound message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connection in the session.
    All,
    /// Every connection of one player.
    Player(PlayerId),
}

// ---------------------------------------------------------------------------
// Words
// ---------------------------------------------------------------------------

/// A guessable word and the category it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: u32,
    pub word: String,
    pub category: String,
}

// ---------------------------------------------------------------------------
// Status and options
// ---------------------------------------------------------------------------

/// Lifecycle of a session.
///
/// ```text
/// NotStarted → InProgress → Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// Per-session settings chosen by the leader at creation. Immutable
/// afterwards.
///
/// Missing fields fall back to [`GameOptions::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameOptions {
    /// Rounds to play; every player draws once per round.
    pub max_rounds: u32,
    /// Seconds guessers have per turn.
    pub turn_timer: u32,
    /// Seconds the drawer has to pick a word.
    pub select_word_timer: u32,
    /// Number of candidate words offered to the drawer.
    pub select_word_count: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            turn_timer: 60,
            select_word_timer: 15,
            select_word_count: 3,
        }
    }
}

impl GameOptions {
    pub const MAX_ROUNDS: std::ops::RangeInclusive<u32> = 1..=10;
    pub const TURN_TIMER: std::ops::RangeInclusive<u32> = 5..=300;
    pub const SELECT_WORD_TIMER: std::ops::RangeInclusive<u32> = 3..=120;
    pub const SELECT_WORD_COUNT: std::ops::RangeInclusive<u32> = 1..=5;

    /// Clamp every field into its supported range.
    pub fn validated(mut self) -> Self {
        fn clamp(value: u32, range: &std::ops::RangeInclusive<u32>) -> u32 {
            value.clamp(*range.start(), *range.end())
        }
        let before = self;
        self.max_rounds = clamp(self.max_rounds, &Self::MAX_ROUNDS);
        self.turn_timer = clamp(self.turn_timer, &Self::TURN_TIMER);
        self.select_word_timer = clamp(self.select_word_timer, &Self::SELECT_WORD_TIMER);
        self.select_word_count = clamp(self.select_word_count, &Self::SELECT_WORD_COUNT);
        if before != self {
            tracing::warn!(requested = ?before, using = ?self, "game options out of range, clamping");
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Broadcast views
// ---------------------------------------------------------------------------

/// Public fields of a player as sent to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    #[serde(rename = "playerId")]
    pub id: PlayerId,
    pub username: String,
    pub is_leader: bool,
    pub is_drawing: bool,
    #[serde(rename = "hasGuessedCorrect")]
    pub has_guessed_correctly: bool,
    pub score: i32,
    pub color: String,
}

/// Round progress as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    /// `None` before the game starts and after it finishes.
    pub current_drawer: Option<PlayerId>,
    /// 0 before the game starts.
    pub count: u32,
}

/// Everything a client needs to render the session.
///
/// The word being drawn is never part of the snapshot. Clients get its
/// length and the letters revealed so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: SessionId,
    /// Active roster in turn order.
    pub players: Vec<PlayerView>,
    pub status: GameStatus,
    pub options: GameOptions,
    pub round: RoundView,
    pub is_selecting_word: bool,
    /// Character count of the chosen word, 0 while none is chosen.
    pub word_length: usize,
    pub revealed_letters: Vec<char>,
}
