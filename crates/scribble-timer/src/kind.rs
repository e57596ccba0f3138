//! Timer purposes and their wire names.

use serde::{Deserialize, Serialize};

/// What a countdown is for. At most one timer of each kind is active per
/// session (per player for [`TimerKind::Disconnect`]).
///
/// The serialized names double as the `type` of the server's tick
/// messages and the `timerType` field of client timer requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// The drawer picks one of the offered words.
    #[serde(rename = "selectWordTimer")]
    SelectWord,
    /// Guessers try to find the word.
    #[serde(rename = "guessWordTimer")]
    Guess,
    /// Lobby countdown before the first turn.
    #[serde(rename = "startGameTimer")]
    StartGame,
    /// Grace window for a disconnected player to come back.
    #[serde(rename = "disconnectTimer")]
    Disconnect,
}

impl TimerKind {
    /// Wire name of this timer kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectWord => "selectWordTimer",
            Self::Guess => "guessWordTimer",
            Self::StartGame => "startGameTimer",
            Self::Disconnect => "disconnectTimer",
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
