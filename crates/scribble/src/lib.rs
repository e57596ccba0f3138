//! # Scribble
//!
//! Game server for a live drawing-and-guessing game.
//!
//! Clients create or join a session through the [`SessionRegistry`], then
//! open a WebSocket to `/game/{sessionId}?playerId={id}`. The server binds
//! the connection to the player, broadcasts `gameState`, and routes every
//! `{"type", "payload"}` frame to the session's [`Game`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use scribble::prelude::*;
//!
//! # async fn run() -> Result<(), ScribbleError> {
//! scribble::init_tracing();
//! let registry = Arc::new(SessionRegistry::default());
//! let server = ScribbleServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(registry)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::ScribbleError;
pub use server::{ScribbleServer, ScribbleServerBuilder, ServerConfig};

pub use scribble_game::{
    Game, GameError, GuessOutcome, ReconnectOutcome, RegistryError, SessionConfig,
    SessionRegistry, StaticWordProvider, WordProvider,
};
pub use scribble_hub::HubConfig;
pub use scribble_protocol::{
    ClientMessage, GameOptions, GameSnapshot, GameStatus, PlayerId, ServerMessage, SessionId,
    TimerKind, Word,
};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Everything needed to run a server.
pub mod prelude {
    pub use crate::{
        GameOptions, PlayerId, ScribbleError, ScribbleServer, ServerConfig, SessionConfig,
        SessionId, SessionRegistry, StaticWordProvider, WordProvider,
    };
}
