//! Per-connection handler: binding, pumps, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Parse `/game/{sessionId}?playerId={id}` → find the session
//!   2. Bind the player and register with the hub in one step (restores
//!      a parked player, queues `gameState` for the new connection)
//!   3. Spawn the write pump
//!   4. Loop: receive frames → decode → dispatch to the game

use std::sync::Arc;

use scribble_game::Game;
use scribble_hub::Frame;
use scribble_protocol::{ClientMessage, Codec, PlayerId, ServerMessage, SessionId};
use scribble_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::ScribbleError;
use crate::server::ServerState;

/// Drop guard that releases the connection when the handler exits.
///
/// [`Game::release`] unregisters from the hub and, when that was the
/// player's last connection, parks the player. `Drop` is synchronous, so
/// the cleanup runs on a spawned task.
struct ConnectionGuard {
    game: Arc<Game>,
    conn_id: ConnectionId,
    player_id: PlayerId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let game = Arc::clone(&self.game);
        let conn_id = self.conn_id;
        let player_id = self.player_id.clone();
        tokio::spawn(async move {
            if let Err(e) = game.release(conn_id, &player_id).await {
                tracing::debug!(%conn_id, %player_id, error = %e, "release skipped");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ScribbleError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = conn.request_path(), "handling new connection");

    // --- Step 1: Route ---
    let Some((session_id, player_id)) = parse_game_path(conn.request_path()) else {
        return reject(&conn, &state, 400, "expected /game/{sessionId}?playerId={playerId}").await;
    };
    let Some(game) = state.registry.get(&session_id).await else {
        return reject(&conn, &state, 404, &format!("session {session_id} not found")).await;
    };

    // --- Step 2: Bind ---
    let outbound = match game.bind(conn_id, &player_id).await {
        Ok((_, outbound)) => outbound,
        Err(e) => {
            tracing::debug!(%conn_id, %session_id, %player_id, error = %e, "connection refused");
            return reject(&conn, &state, e.code(), &e.to_string()).await;
        }
    };
    let _guard = ConnectionGuard {
        game: Arc::clone(&game),
        conn_id,
        player_id: player_id.clone(),
    };
    tracing::info!(%conn_id, %session_id, %player_id, "player connected");

    // --- Step 3: Pumps ---
    tokio::spawn(write_pump(Arc::clone(&conn), outbound));

    loop {
        let data = match tokio::time::timeout(state.config.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%player_id, "connection timed out");
                break;
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode message");
                let reply = ServerMessage::error(400, format!("invalid message: {e}"));
                game.send_to(&player_id, &reply).await;
                continue;
            }
        };

        if let Err(e) = game.handle_message(&player_id, msg).await {
            tracing::debug!(%player_id, error = %e, "message rejected");
            game.send_to(&player_id, &ServerMessage::error(e.code(), e.to_string()))
                .await;
        }
    }

    let _ = conn.close().await;
    // _guard drops here → unregister, then park the player if this was
    // their last connection.
    Ok(())
}

/// Forwards queued frames to the socket until the hub closes the buffer.
async fn write_pump(conn: Arc<WebSocketConnection>, mut outbound: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
    }
    // Evicted, unregistered, or the session shut down.
    let _ = conn.close().await;
}

/// Sends an error frame straight to the socket and closes it.
///
/// Only used before the connection is registered with a hub.
async fn reject(
    conn: &WebSocketConnection,
    state: &ServerState,
    code: u16,
    message: &str,
) -> Result<(), ScribbleError> {
    let bytes = state.codec.encode(&ServerMessage::error(code, message))?;
    conn.send(&bytes).await?;
    conn.close().await?;
    Ok(())
}

/// Splits `/game/{sessionId}?playerId={id}` into its two identifiers.
fn parse_game_path(path: &str) -> Option<(SessionId, PlayerId)> {
    let (route, query) = path.split_once('?')?;
    let session = route.strip_prefix("/game/")?.trim_end_matches('/');
    if session.is_empty() || session.contains('/') {
        return None;
    }
    let player = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "playerId")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())?;
    Some((SessionId::from(session), PlayerId::from(player)))
}
