//! Error types for the connection hub.

use scribble_protocol::PlayerId;

/// Errors returned by [`HubHandle`](crate::HubHandle) operations.
///
/// All of these are delivery failures: callers log them and move on.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub has shut down.
    #[error("connection hub is closed")]
    Closed,

    /// The player has no registered connection.
    #[error("player {0} has no open connection")]
    NotFound(PlayerId),

    /// The player's outbound buffer stayed full for the whole send window.
    #[error("outbound buffer for player {0} is full")]
    ChannelFull(PlayerId),
}
