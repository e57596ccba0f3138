//! Session configuration.

use std::time::Duration;

use scribble_hub::HubConfig;

use crate::player::PALETTE;

/// Server-side limits shared by every session a registry creates.
///
/// Per-session gameplay settings live in
/// [`GameOptions`](scribble_protocol::GameOptions) instead.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Roster cap, counting players waiting to reconnect.
    pub max_players: usize,
    /// Players needed before the leader can start.
    pub min_players: usize,
    /// How long a disconnected player keeps their seat.
    pub reconnect_grace: Duration,
    /// Length of the lobby countdown.
    pub start_countdown: Duration,
    /// Connection hub settings.
    pub hub: HubConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            min_players: 2,
            reconnect_grace: Duration::from_secs(30),
            start_countdown: Duration::from_secs(5),
            hub: HubConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Clamp values so the config is safe to use.
    ///
    /// - `max_players` is at most the palette size, so colours stay unique.
    /// - `min_players` is between 1 and `max_players`.
    pub fn validated(mut self) -> Self {
        if self.max_players > PALETTE.len() {
            tracing::warn!(
                max_players = self.max_players,
                cap = PALETTE.len(),
                "max_players exceeds colour palette, clamping"
            );
        }
        self.max_players = self.max_players.clamp(1, PALETTE.len());
        self.min_players = self.min_players.clamp(1, self.max_players);
        self.hub = self.hub.validated();
        self
    }
}
