//! Session coordination for Scribble.
//!
//! - [`Game`] runs one session: roster, lobby countdown, turns, scoring,
//!   and reconnects.
//! - [`Round`] and [`Turn`] hold the drawer rotation and the state of the
//!   current turn.
//! - [`SessionRegistry`] creates and tracks sessions.
//! - [`WordProvider`] supplies candidate words.
//!
//! ```text
//! Registry ─ create/join ─→ Game ─ effects ─→ Hub ─→ connections
//!                            ↑
//!              CountdownTimer callbacks
//! ```

mod config;
mod error;
mod game;
mod player;
mod registry;
mod round;
mod scoring;
mod turn;
mod words;

pub use config::SessionConfig;
pub use error::{GameError, RegistryError};
pub use game::{Game, GuessOutcome, ReconnectOutcome};
pub use player::{PALETTE, Player, pick_color};
pub use registry::SessionRegistry;
pub use round::{Advance, Round};
pub use scoring::{Verdict, evaluate, levenshtein, score_for};
pub use turn::{Turn, TurnPhase, TurnProgress};
pub use words::{StaticWordProvider, WordProvider};
