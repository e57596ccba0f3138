//! Hub actor: the single owner of a session's live connections.
//!
//! All registration, removal and fan-out goes through one Tokio task
//! that reads [`HubCommand`]s from a bounded channel. Nothing else ever
//! touches a connection's outbound buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scribble_protocol::{PlayerId, SessionId};
use scribble_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{HubConfig, HubError};

/// One encoded frame, shared between every connection it is sent to.
pub type Frame = Arc<[u8]>;

/// Commands sent to the hub actor.
pub(crate) enum HubCommand {
    Register {
        conn_id: ConnectionId,
        player_id: PlayerId,
        reply: oneshot::Sender<mpsc::Receiver<Frame>>,
    },
    /// Replies with how many connections the same player still has.
    Unregister {
        conn_id: ConnectionId,
        player_id: PlayerId,
        reply: oneshot::Sender<usize>,
    },
    Broadcast {
        frame: Frame,
    },
    SendTo {
        player_id: PlayerId,
        frame: Frame,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Clients {
        reply: oneshot::Sender<Vec<(ConnectionId, PlayerId)>>,
    },
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    session_id: SessionId,
    sender: mpsc::Sender<HubCommand>,
    token: CancellationToken,
}

impl HubHandle {
    /// The session this hub serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Registers a connection and returns the receiving end of its
    /// outbound buffer. The receiver yields `None` once the hub drops the
    /// connection (unregister, eviction, or shutdown).
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        player_id: PlayerId,
    ) -> Result<mpsc::Receiver<Frame>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::Register { conn_id, player_id, reply })
            .await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Removes a connection and closes its outbound buffer.
    ///
    /// Returns the number of connections `player_id` still has
    /// registered; 0 means the player is now offline. Unregistering a
    /// connection the hub already evicted is not an error.
    pub async fn unregister(
        &self,
        conn_id: ConnectionId,
        player_id: PlayerId,
    ) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::Unregister { conn_id, player_id, reply })
            .await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Queues a frame for every registered connection. Connections whose
    /// buffer is full are evicted.
    pub async fn broadcast(&self, frame: Frame) -> Result<(), HubError> {
        self.command(HubCommand::Broadcast { frame }).await
    }

    /// Queues a frame for every connection of one player.
    ///
    /// # Errors
    /// [`HubError::NotFound`] if the player has no connection and
    /// [`HubError::ChannelFull`] if no connection had room within the
    /// configured send timeout.
    pub async fn send_to(
        &self,
        player_id: PlayerId,
        frame: Frame,
    ) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::SendTo { player_id, frame, reply })
            .await?;
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Registered connections and their players.
    pub async fn clients(
        &self,
    ) -> Result<Vec<(ConnectionId, PlayerId)>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::Clients { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Stops the hub. Every outbound buffer is closed and later calls
    /// return [`HubError::Closed`]. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn command(&self, cmd: HubCommand) -> Result<(), HubError> {
        if self.token.is_cancelled() {
            return Err(HubError::Closed);
        }
        self.sender.send(cmd).await.map_err(|_| HubError::Closed)
    }
}

struct Client {
    player_id: PlayerId,
    sender: mpsc::Sender<Frame>,
}

/// The internal hub state. Runs inside a Tokio task.
struct HubActor {
    session_id: SessionId,
    config: HubConfig,
    clients: HashMap<ConnectionId, Client>,
    receiver: mpsc::Receiver<HubCommand>,
    token: CancellationToken,
}

impl HubActor {
    async fn run(mut self) {
        tracing::debug!(session_id = %self.session_id, "hub started");

        loop {
            let cmd = tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            self.handle(cmd);
        }

        self.close();
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { conn_id, player_id, reply } => {
                let (tx, rx) = mpsc::channel(self.config.outbound_buffer);
                tracing::debug!(
                    session_id = %self.session_id,
                    %conn_id,
                    %player_id,
                    "connection registered"
                );
                self.clients.insert(conn_id, Client { player_id, sender: tx });
                let _ = reply.send(rx);
            }
            HubCommand::Unregister { conn_id, player_id, reply } => {
                if self.clients.remove(&conn_id).is_some() {
                    tracing::debug!(
                        session_id = %self.session_id,
                        %conn_id,
                        %player_id,
                        "connection unregistered"
                    );
                }
                let _ = reply.send(self.connections_of(&player_id));
            }
            HubCommand::Broadcast { frame } => self.broadcast(frame),
            HubCommand::SendTo { player_id, frame, reply } => {
                self.send_to(player_id, frame, reply);
            }
            HubCommand::Clients { reply } => {
                let mut clients: Vec<_> = self
                    .clients
                    .iter()
                    .map(|(id, c)| (*id, c.player_id.clone()))
                    .collect();
                clients.sort_by_key(|(id, _)| *id);
                let _ = reply.send(clients);
            }
        }
    }

    fn broadcast(&mut self, frame: Frame) {
        let mut evicted = Vec::new();
        for (conn_id, client) in &self.clients {
            match client.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        %conn_id,
                        player_id = %client.player_id,
                        "outbound buffer full, evicting slow connection"
                    );
                    evicted.push(*conn_id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*conn_id),
            }
        }
        for conn_id in evicted {
            // Dropping the sender closes the buffer; the write pump sees
            // `None` after draining what is already queued.
            self.clients.remove(&conn_id);
        }
    }

    /// Queues a unicast without waiting. When every connection of the
    /// player is backed up, the bounded wait runs on its own task so the
    /// control loop keeps serving everyone else. Such a late frame may land
    /// after broadcasts queued in the meantime.
    fn send_to(
        &mut self,
        player_id: PlayerId,
        frame: Frame,
        reply: oneshot::Sender<Result<(), HubError>>,
    ) {
        let mut delivered = false;
        let mut backed_up = Vec::new();
        let mut closed = Vec::new();
        for (conn_id, client) in self.clients.iter().filter(|(_, c)| c.player_id == player_id) {
            match client.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered = true,
                Err(TrySendError::Full(_)) => backed_up.push(client.sender.clone()),
                Err(TrySendError::Closed(_)) => closed.push(*conn_id),
            }
        }
        for conn_id in closed {
            self.clients.remove(&conn_id);
        }

        if delivered {
            let _ = reply.send(Ok(()));
        } else if backed_up.is_empty() {
            let _ = reply.send(Err(HubError::NotFound(player_id)));
        } else {
            tokio::spawn(wait_for_room(
                self.session_id.clone(),
                player_id,
                frame,
                backed_up,
                self.config.send_timeout,
                self.token.clone(),
                reply,
            ));
        }
    }

    fn connections_of(&self, player_id: &PlayerId) -> usize {
        self.clients
            .values()
            .filter(|c| &c.player_id == player_id)
            .count()
    }

    fn close(mut self) {
        let open = self.clients.len();
        // Queued commands are dropped unanswered; their callers get `Closed`.
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
        self.clients.clear();
        self.token.cancel();
        tracing::debug!(
            session_id = %self.session_id,
            closed_connections = open,
            "hub stopped"
        );
    }
}

/// Retries a unicast on each backed-up connection for up to
/// `send_timeout`, stopping early if the hub shuts down.
async fn wait_for_room(
    session_id: SessionId,
    player_id: PlayerId,
    frame: Frame,
    senders: Vec<mpsc::Sender<Frame>>,
    send_timeout: Duration,
    token: CancellationToken,
    reply: oneshot::Sender<Result<(), HubError>>,
) {
    let mut delivered = false;
    for sender in senders {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                let _ = reply.send(Err(HubError::Closed));
                return;
            }
            sent = tokio::time::timeout(send_timeout, sender.send(Arc::clone(&frame))) => {
                delivered |= matches!(sent, Ok(Ok(())));
            }
        }
    }

    let result = if delivered {
        Ok(())
    } else {
        tracing::warn!(%session_id, %player_id, "unicast dropped, outbound buffer full");
        Err(HubError::ChannelFull(player_id))
    };
    let _ = reply.send(result);
}

/// Spawns a hub task for one session.
///
/// The hub stops when `parent` or the returned handle's
/// [`shutdown`](HubHandle::shutdown) is cancelled.
pub fn spawn_hub(
    session_id: SessionId,
    config: HubConfig,
    parent: &CancellationToken,
) -> HubHandle {
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let token = parent.child_token();

    let actor = HubActor {
        session_id: session_id.clone(),
        config,
        clients: HashMap::new(),
        receiver: rx,
        token: token.clone(),
    };
    tokio::spawn(actor.run());

    HubHandle {
        session_id,
        sender: tx,
        token,
    }
}
