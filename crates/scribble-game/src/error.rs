//! Error types for sessions and the session registry.

use scribble_protocol::{PlayerId, SessionId, TimerKind};

/// A rejected request against a single session.
///
/// Session state is unchanged whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The player is neither on the roster nor waiting to reconnect.
    #[error("player {0} is not in this session")]
    UnknownPlayer(PlayerId),

    /// The id is already taken by an active or disconnected player.
    #[error("player {0} is already in this session")]
    DuplicatePlayer(PlayerId),

    /// No player slots left.
    #[error("session is full ({0} players)")]
    SessionFull(usize),

    /// Joining or starting is only possible before the game begins.
    #[error("game already started")]
    AlreadyStarted,

    /// The game is over.
    #[error("game is finished")]
    Finished,

    #[error("need at least {need} players to start, have {have}")]
    NotEnoughPlayers { have: usize, need: usize },

    /// Only the leader may control the lobby countdown.
    #[error("player {0} is not the session leader")]
    NotLeader(PlayerId),

    /// Only the current drawer may pick the word.
    #[error("player {0} is not the current drawer")]
    NotDrawer(PlayerId),

    #[error("the drawer cannot guess")]
    DrawerCannotGuess,

    /// The request does not fit the current turn phase.
    #[error("{0}")]
    WrongPhase(&'static str),

    /// The selected word was not among the offered candidates.
    #[error("word {0:?} was not offered")]
    WordNotOffered(String),

    /// Clients may only start or stop the lobby countdown.
    #[error("{0} cannot be controlled by clients")]
    UnsupportedTimer(TimerKind),

    /// A drawer was requested from an empty roster.
    #[error("no players left to draw")]
    EmptyRoster,

    /// The session has been shut down.
    #[error("session is shut down")]
    ShutDown,
}

impl GameError {
    /// Status code sent back in `error` frames.
    pub fn code(&self) -> u16 {
        match self {
            Self::WordNotOffered(_) | Self::UnsupportedTimer(_) => 400,
            Self::SessionFull(_)
            | Self::AlreadyStarted
            | Self::NotLeader(_)
            | Self::NotDrawer(_)
            | Self::DrawerCannotGuess => 403,
            Self::UnknownPlayer(_) => 404,
            Self::DuplicatePlayer(_)
            | Self::Finished
            | Self::NotEnoughPlayers { .. }
            | Self::WrongPhase(_) => 409,
            Self::ShutDown => 410,
            Self::EmptyRoster => 500,
        }
    }
}

/// Errors from [`SessionRegistry`](crate::SessionRegistry) operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Joining a game that is already running.
    #[error("session {0} is in progress")]
    InProgress(SessionId),

    #[error("session {0} is finished")]
    Finished(SessionId),

    #[error("player {0} is already in session {1}")]
    DuplicatePlayer(PlayerId, SessionId),

    #[error("session {0} is full")]
    Full(SessionId),

    /// Any other rejection from the session itself.
    #[error(transparent)]
    Game(#[from] GameError),
}

impl RegistryError {
    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InProgress(_) | Self::Full(_) => 403,
            Self::Finished(_) | Self::DuplicatePlayer(..) => 409,
            Self::Game(e) => e.code(),
        }
    }
}
