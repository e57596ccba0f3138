//! Typed server→client and client→server messages.
//!
//! Every frame is a JSON object `{"type": "...", "payload": {...}}`.
//! Outbound messages map one-to-one onto [`ServerMessage`] variants.
//! Inbound frames are parsed once at the connection boundary into a
//! [`ClientMessage`]; unrecognised `type`s become
//! [`ClientMessage::Unknown`] instead of an error.

use scribble_timer::TimerKind;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{GameSnapshot, PlayerId, PlayerView, Word};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of messages that carry no data. Serializes as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectableWordsPayload {
    pub selectable_words: Vec<Word>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPayload {
    pub time_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedLetterPayload {
    pub revealed_letter: String,
}

/// A guess, or a notice about one.
///
/// Inbound, `player_id` and `username` are optional and the server
/// trusts the connection's identity over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessPayload {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub username: String,
    pub guess: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdatePayload {
    pub player_id: PlayerId,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    pub player_id: PlayerId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRequestPayload {
    pub timer_type: TimerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectWordPayload {
    pub word: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full session snapshot.
    GameState(GameSnapshot),
    /// Drawer only: pick one of these words.
    OpenSelectWordModal(SelectableWordsPayload),
    /// Drawer only: the word is chosen.
    CloseSelectWordModal(EmptyPayload),
    SelectWordTimer(TimerPayload),
    GuessWordTimer(TimerPayload),
    StartGameTimer(TimerPayload),
    /// One more letter of the word, left to right.
    RevealedLetter(RevealedLetterPayload),
    /// A wrong guess, relayed verbatim.
    PlayerGuess(GuessPayload),
    /// "X guessed the word!" or "X is close!"; the guess text is never
    /// relayed for these.
    #[serde(rename = "player_guess")]
    GuessNotice(GuessPayload),
    ScoreUpdate(ScoreUpdatePayload),
    #[serde(rename = "player_left")]
    PlayerLeft(PlayerLeftPayload),
    PlayerJoined(PlayerView),
    PlayerReconnected(PlayerView),
    /// Unicast reply to a rejected request.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Tick message for a timer kind. Disconnect grace timers are not
    /// shown to clients and yield `None`.
    pub fn timer_tick(kind: TimerKind, remaining: u32) -> Option<Self> {
        let payload = TimerPayload { time_remaining: remaining };
        match kind {
            TimerKind::SelectWord => Some(Self::SelectWordTimer(payload)),
            TimerKind::Guess => Some(Self::GuessWordTimer(payload)),
            TimerKind::StartGame => Some(Self::StartGameTimer(payload)),
            TimerKind::Disconnect => None,
        }
    }

    /// Builds an [`ServerMessage::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload { code, message: message.into() })
    }

    /// Wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GameState(_) => "gameState",
            Self::OpenSelectWordModal(_) => "openSelectWordModal",
            Self::CloseSelectWordModal(_) => "closeSelectWordModal",
            Self::SelectWordTimer(_) => "selectWordTimer",
            Self::GuessWordTimer(_) => "guessWordTimer",
            Self::StartGameTimer(_) => "startGameTimer",
            Self::RevealedLetter(_) => "revealedLetter",
            Self::PlayerGuess(_) => "playerGuess",
            Self::GuessNotice(_) => "player_guess",
            Self::ScoreUpdate(_) => "scoreUpdate",
            Self::PlayerLeft(_) => "player_left",
            Self::PlayerJoined(_) => "playerJoined",
            Self::PlayerReconnected(_) => "playerReconnected",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages clients send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    StartTimer(TimerRequestPayload),
    StopTimer(TimerRequestPayload),
    SelectWord(SelectWordPayload),
    PlayerGuess(GuessPayload),
    /// A `type` this server does not handle. Holds the raw type name.
    #[serde(skip_serializing)]
    Unknown(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl TryFrom<RawEnvelope> for ClientMessage {
    type Error = serde_json::Error;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let payload = raw.payload;
        Ok(match raw.kind.as_str() {
            "startTimer" => Self::StartTimer(serde_json::from_value(payload)?),
            "stopTimer" => Self::StopTimer(serde_json::from_value(payload)?),
            "selectWord" => Self::SelectWord(serde_json::from_value(payload)?),
            "playerGuess" => Self::PlayerGuess(serde_json::from_value(payload)?),
            _ => Self::Unknown(raw.kind),
        })
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}
