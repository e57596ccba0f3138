//! Wire protocol for Scribble.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`PlayerId`], [`GameOptions`], [`GameSnapshot`], ...):
//!   identifiers, settings and the broadcast view of a session.
//! - **Messages** ([`ServerMessage`], [`ClientMessage`]): the
//!   `{"type", "payload"}` frames in both directions.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become
//!   bytes.
//!
//! The protocol layer knows nothing about connections or game rules.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Game
//! Game → Protocol (ServerMessage) → Hub (bytes) → Transport
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, EmptyPayload, ErrorPayload, GuessPayload, PlayerLeftPayload,
    RevealedLetterPayload, ScoreUpdatePayload, SelectWordPayload, SelectableWordsPayload,
    ServerMessage, TimerPayload, TimerRequestPayload,
};
pub use scribble_timer::TimerKind;
pub use types::{
    GameOptions, GameSnapshot, GameStatus, PlayerId, PlayerView, Recipient, RoundView, SessionId,
    Word,
};
