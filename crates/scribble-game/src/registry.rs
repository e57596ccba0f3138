//! Session registry: creates, finds, and removes games.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use scribble_protocol::{GameOptions, PlayerId, PlayerView, SessionId};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{Game, GameError, RegistryError, SessionConfig, StaticWordProvider, WordProvider};

/// All live sessions of a server.
///
/// Shared by `Arc` between the connection handlers; there is no global
/// instance.
pub struct SessionRegistry {
    games: RwLock<HashMap<SessionId, Arc<Game>>>,
    words: Arc<dyn WordProvider>,
    config: SessionConfig,
    /// Parent of every session's token.
    token: CancellationToken,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default(), Arc::new(StaticWordProvider::default()))
    }
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, words: Arc<dyn WordProvider>) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            words,
            config: config.validated(),
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session led by `leader_id` and returns its id.
    pub async fn create_game(
        &self,
        options: GameOptions,
        leader_id: PlayerId,
        leader_name: impl Into<String>,
    ) -> SessionId {
        let mut games = self.games.write().await;
        let id = loop {
            let id = generate_session_id();
            if !games.contains_key(&id) {
                break id;
            }
        };
        let game = Game::new(
            id.clone(),
            options,
            leader_id,
            leader_name,
            self.config.clone(),
            Arc::clone(&self.words),
            &self.token,
        );
        tracing::info!(session_id = %id, options = ?game.options(), "session created");
        games.insert(id.clone(), game);
        id
    }

    /// Adds a player to a session that has not started yet.
    ///
    /// # Errors
    /// - [`RegistryError::NotFound`]: no such session.
    /// - [`RegistryError::InProgress`]: the game already started.
    /// - [`RegistryError::Finished`]: the game is over.
    /// - [`RegistryError::DuplicatePlayer`]: the id is taken.
    /// - [`RegistryError::Full`]: the roster is at its cap.
    pub async fn join_game(
        &self,
        session_id: &SessionId,
        player_id: PlayerId,
        username: impl Into<String>,
    ) -> Result<PlayerView, RegistryError> {
        let game = self
            .get(session_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(session_id.clone()))?;
        game.add_player(player_id, username)
            .await
            .map_err(|e| match e {
                GameError::AlreadyStarted => RegistryError::InProgress(session_id.clone()),
                GameError::Finished => RegistryError::Finished(session_id.clone()),
                GameError::DuplicatePlayer(p) => {
                    RegistryError::DuplicatePlayer(p, session_id.clone())
                }
                GameError::SessionFull(_) => RegistryError::Full(session_id.clone()),
                GameError::ShutDown => RegistryError::NotFound(session_id.clone()),
                other => RegistryError::Game(other),
            })
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Game>> {
        self.games.read().await.get(session_id).cloned()
    }

    /// Removes a session and shuts it down. Returns whether it existed.
    pub async fn remove_game(&self, session_id: &SessionId) -> bool {
        let removed = self.games.write().await.remove(session_id);
        match removed {
            Some(game) => {
                game.shutdown();
                tracing::info!(%session_id, "session removed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.read().await.is_empty()
    }

    /// Shuts down and forgets every session.
    pub async fn shutdown(&self) {
        let games: Vec<_> = self.games.write().await.drain().collect();
        for (_, game) in &games {
            game.shutdown();
        }
        self.token.cancel();
        tracing::info!(sessions = games.len(), "registry shut down");
    }
}

/// 32 lowercase hex characters from 16 random bytes.
fn generate_session_id() -> SessionId {
    let bytes: [u8; 16] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    SessionId(hex)
}
