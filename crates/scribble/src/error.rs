//! Unified error type for the Scribble server.

use scribble_game::{GameError, RegistryError};
use scribble_hub::HubError;
use scribble_protocol::ProtocolError;
use scribble_timer::TimerError;
use scribble_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// The `#[from]` variants let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum ScribbleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use scribble_protocol::{PlayerId, SessionId};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: ScribbleError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, ScribbleError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_hub_error() {
        let err: ScribbleError = HubError::Closed.into();
        assert!(matches!(err, ScribbleError::Hub(_)));
    }

    #[test]
    fn test_from_game_error_keeps_message() {
        let err: ScribbleError = GameError::NotLeader(PlayerId::from("p1")).into();
        assert!(matches!(err, ScribbleError::Game(_)));
        assert_eq!(err.to_string(), "player p1 is not the session leader");
    }

    #[test]
    fn test_from_registry_error() {
        let err: ScribbleError = RegistryError::NotFound(SessionId::from("s")).into();
        assert!(matches!(err, ScribbleError::Registry(_)));
    }
}
