//! The session coordinator.
//!
//! A [`Game`] owns one session's roster, round, and turn behind a single
//! `RwLock`. Every operation follows the same shape:
//!
//! 1. Take the write lock and change the state.
//! 2. Collect the outbound messages and timers to start in [`Effects`].
//! 3. Still holding the lock, hand the messages to the hub, then start
//!    the timers.
//!
//! Frames therefore reach the hub in the order the state changed, and a
//! timer never starts before the messages produced alongside it. The hub
//! never takes the session lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use scribble_hub::{Frame, HubError, HubHandle, spawn_hub};
use scribble_protocol::{
    ClientMessage, Codec, EmptyPayload, GameOptions, GameSnapshot, GameStatus, GuessPayload,
    JsonCodec, PlayerId, PlayerLeftPayload, PlayerView, Recipient, RevealedLetterPayload,
    RoundView, ScoreUpdatePayload, SelectableWordsPayload, ServerMessage, SessionId, Word,
};
use scribble_timer::{CountdownObserver, CountdownTimer, TimerKind, TimerState};
use scribble_transport::ConnectionId;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use crate::player::{Player, pick_color};
use crate::round::{Advance, Round};
use crate::scoring::{self, Verdict};
use crate::turn::{Turn, TurnPhase};
use crate::{GameError, SessionConfig, WordProvider};

/// Result of a guess that was accepted for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Exact match; the guesser earned `points`.
    Correct { points: i32 },
    /// Within edit distance 2.
    Close,
    Wrong,
    /// The player already guessed this turn's word. Nothing happened.
    AlreadyGuessed,
}

/// Result of a successful reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The player was restored from the disconnected map.
    Restored,
    /// The player was still on the roster; nothing changed.
    AlreadyActive,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A disconnected player and the roster slot they left.
struct Parked {
    player: Player,
    slot: usize,
}

struct GameState {
    status: GameStatus,
    roster: Vec<Player>,
    parked: HashMap<PlayerId, Parked>,
    round: Round,
    turn: Option<Turn>,
    /// Lowercased words already played.
    used_words: HashSet<String>,
    /// Words offered to the current drawer.
    candidates: Vec<Word>,
    start_timer: Option<CountdownTimer>,
    next_generation: u64,
}

impl GameState {
    fn position(&self, id: &PlayerId) -> Option<usize> {
        self.roster.iter().position(|p| &p.id == id)
    }

    fn contains(&self, id: &PlayerId) -> bool {
        self.position(id).is_some() || self.parked.contains_key(id)
    }

    /// Roster or parked record of `id`.
    fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        match self.roster.iter_mut().find(|p| &p.id == id) {
            Some(p) => Some(p),
            None => self.parked.get_mut(id).map(|p| &mut p.player),
        }
    }

    fn all_players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.roster
            .iter_mut()
            .chain(self.parked.values_mut().map(|p| &mut p.player))
    }

    fn colors(&self) -> Vec<&str> {
        self.roster
            .iter()
            .map(|p| p.color.as_str())
            .chain(self.parked.values().map(|p| p.player.color.as_str()))
            .collect()
    }

    /// Every guesser still on the roster has guessed the word.
    fn all_guessed(&self) -> bool {
        let Some(turn) = &self.turn else { return false };
        turn.is_guessing()
            && !turn.guessed.is_empty()
            && self
                .roster
                .iter()
                .filter(|p| p.id != turn.drawer)
                .all(|p| turn.guessed.contains(&p.id))
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// What a countdown does when it expires.
#[derive(Debug, Clone)]
enum TimerTarget {
    SelectWord { generation: u64 },
    Guess { generation: u64 },
    StartGame,
    Grace(PlayerId),
}

struct RevealPlan {
    generation: u64,
    letters: usize,
    interval: Duration,
    /// The guess timer's token; revealing stops with the timer.
    token: CancellationToken,
}

/// Side effects collected under the state lock and applied after it is
/// released.
#[derive(Default)]
struct Effects {
    messages: Vec<(Recipient, ServerMessage)>,
    timers: Vec<(CountdownTimer, TimerTarget)>,
    reveal: Option<RevealPlan>,
}

impl Effects {
    fn all(&mut self, msg: ServerMessage) {
        self.messages.push((Recipient::All, msg));
    }

    fn to(&mut self, player_id: &PlayerId, msg: ServerMessage) {
        self.messages.push((Recipient::Player(player_id.clone()), msg));
    }

    fn start(&mut self, timer: CountdownTimer, target: TimerTarget) {
        self.timers.push((timer, target));
    }
}

fn secs(n: u32) -> Duration {
    Duration::from_secs(u64::from(n))
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// One running game session.
pub struct Game {
    id: SessionId,
    options: GameOptions,
    config: SessionConfig,
    hub: HubHandle,
    words: Arc<dyn WordProvider>,
    codec: JsonCodec,
    state: RwLock<GameState>,
    /// Parent of the hub and every timer of this session.
    token: CancellationToken,
    shut_down: AtomicBool,
    me: Weak<Game>,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Game {
    /// Creates a session with `leader` as its first player and spawns its
    /// hub. Must be called inside a Tokio runtime.
    ///
    /// The session stops when `parent` is cancelled or on
    /// [`shutdown`](Self::shutdown).
    pub fn new(
        id: SessionId,
        options: GameOptions,
        leader_id: PlayerId,
        leader_name: impl Into<String>,
        config: SessionConfig,
        words: Arc<dyn WordProvider>,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let options = options.validated();
        let config = config.validated();
        let token = parent.child_token();
        let hub = spawn_hub(id.clone(), config.hub.clone(), &token);

        let mut leader = Player::new(leader_id, leader_name, pick_color([]));
        leader.is_leader = true;

        let state = GameState {
            status: GameStatus::NotStarted,
            roster: vec![leader],
            parked: HashMap::new(),
            round: Round::new(),
            turn: None,
            used_words: HashSet::new(),
            candidates: Vec::new(),
            start_timer: None,
            next_generation: 0,
        };

        Arc::new_cyclic(|me| Self {
            id,
            options,
            config,
            hub,
            words,
            codec: JsonCodec,
            state: RwLock::new(state),
            token,
            shut_down: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    /// The hub that owns this session's connections.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // -- Queries ------------------------------------------------------------

    /// The broadcastable view of the session. Never contains the word.
    pub async fn snapshot(&self) -> GameSnapshot {
        let state = self.state.read().await;
        self.snapshot_of(&state)
    }

    pub async fn status(&self) -> GameStatus {
        self.state.read().await.status
    }

    /// Active or disconnected player record.
    pub async fn player(&self, id: &PlayerId) -> Option<Player> {
        let state = self.state.read().await;
        state
            .roster
            .iter()
            .find(|p| &p.id == id)
            .or_else(|| state.parked.get(id).map(|p| &p.player))
            .cloned()
    }

    /// Whether `id` is waiting to reconnect.
    pub async fn is_disconnected(&self, id: &PlayerId) -> bool {
        self.state.read().await.parked.contains_key(id)
    }

    /// The word being drawn, if one was chosen. Server side only.
    pub async fn current_word(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .turn
            .as_ref()
            .and_then(|t| t.word.as_ref())
            .map(|w| w.word.clone())
    }

    /// Words currently offered to the drawer.
    pub async fn selectable_words(&self) -> Vec<Word> {
        self.state.read().await.candidates.clone()
    }

    /// Players who finished a turn in the current round.
    pub async fn drawn_this_round(&self) -> HashSet<PlayerId> {
        self.state.read().await.round.drawn().clone()
    }

    fn snapshot_of(&self, state: &GameState) -> GameSnapshot {
        let turn = state.turn.as_ref();
        let current_drawer = match state.status {
            GameStatus::InProgress => turn.map(|t| t.drawer.clone()),
            _ => None,
        };
        let count = match state.status {
            GameStatus::NotStarted => 0,
            _ => state.round.count(),
        };
        GameSnapshot {
            id: self.id.clone(),
            players: state.roster.iter().map(Player::view).collect(),
            status: state.status,
            options: self.options,
            round: RoundView { current_drawer, count },
            is_selecting_word: turn.is_some_and(|t| t.phase == TurnPhase::Selecting),
            word_length: turn.map_or(0, Turn::word_length),
            revealed_letters: turn.map_or_else(Vec::new, |t| t.revealed.clone()),
        }
    }

    // -- Roster -------------------------------------------------------------

    /// Adds a player before the game starts and announces them.
    ///
    /// # Errors
    /// [`GameError::DuplicatePlayer`] if the id is active or waiting to
    /// reconnect, [`GameError::SessionFull`] at the player cap, and
    /// [`GameError::AlreadyStarted`] / [`GameError::Finished`] once the
    /// lobby is closed.
    pub async fn add_player(
        &self,
        player_id: PlayerId,
        username: impl Into<String>,
    ) -> Result<PlayerView, GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.status {
            GameStatus::NotStarted => {}
            GameStatus::InProgress => return Err(GameError::AlreadyStarted),
            GameStatus::Finished => return Err(GameError::Finished),
        }
        if state.contains(&player_id) {
            return Err(GameError::DuplicatePlayer(player_id));
        }
        if state.roster.len() + state.parked.len() >= self.config.max_players {
            return Err(GameError::SessionFull(self.config.max_players));
        }

        let color = pick_color(state.colors());
        let player = Player::new(player_id, username, color);
        let view = player.view();
        state.roster.push(player);
        tracing::info!(
            session_id = %self.id,
            player_id = %view.id,
            players = state.roster.len(),
            "player joined"
        );

        fx.all(ServerMessage::PlayerJoined(view.clone()));
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));
        self.apply(fx).await;
        Ok(view)
    }

    /// Binds a new connection to `player_id` and registers it with the hub.
    ///
    /// A parked player is restored first. Both steps happen under the
    /// session lock, so they never interleave with [`release`](Self::release)
    /// of another connection of the same player. The new connection gets a
    /// fresh `gameState`.
    ///
    /// # Errors
    /// [`GameError::UnknownPlayer`] if the player is neither on the roster
    /// nor waiting to reconnect, and [`GameError::ShutDown`] once the hub
    /// is gone.
    pub async fn bind(
        &self,
        conn_id: ConnectionId,
        player_id: &PlayerId,
    ) -> Result<(ReconnectOutcome, mpsc::Receiver<Frame>), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let outcome = match self.reconnect_locked(state, player_id, &mut fx) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.apply(fx).await;
                return Err(e);
            }
        };
        let outbound = self
            .hub
            .register(conn_id, player_id.clone())
            .await
            .map_err(|_| GameError::ShutDown)?;
        if outcome == ReconnectOutcome::AlreadyActive {
            fx.all(ServerMessage::GameState(self.snapshot_of(state)));
        }
        tracing::debug!(session_id = %self.id, %conn_id, %player_id, ?outcome, "connection bound");
        self.apply(fx).await;
        Ok((outcome, outbound))
    }

    /// Unregisters a connection. When it was the player's last one the
    /// player is parked, as in [`handle_disconnect`](Self::handle_disconnect).
    ///
    /// Returns how many connections the player still has.
    pub async fn release(
        &self,
        conn_id: ConnectionId,
        player_id: &PlayerId,
    ) -> Result<usize, GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let remaining = self
            .hub
            .unregister(conn_id, player_id.clone())
            .await
            .map_err(|_| GameError::ShutDown)?;
        if remaining == 0 {
            self.park_locked(state, player_id, &mut fx)?;
            self.apply(fx).await;
        } else {
            tracing::debug!(session_id = %self.id, %player_id, remaining, "player still connected elsewhere");
        }
        Ok(remaining)
    }

    /// Moves a player from the roster to the disconnected map and starts
    /// their grace timer.
    ///
    /// A drawer leaving ends the turn. A guesser leaving ends it when
    /// everyone left on the roster has already guessed.
    pub async fn handle_disconnect(&self, player_id: &PlayerId) -> Result<(), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        self.park_locked(&mut guard, player_id, &mut fx)?;
        self.apply(fx).await;
        Ok(())
    }

    fn park_locked(
        &self,
        state: &mut GameState,
        player_id: &PlayerId,
        fx: &mut Effects,
    ) -> Result<(), GameError> {
        let Some(idx) = state.position(player_id) else {
            return if state.parked.contains_key(player_id) {
                Ok(())
            } else {
                Err(GameError::UnknownPlayer(player_id.clone()))
            };
        };

        let mut player = state.roster.remove(idx);
        let in_progress = state.status == GameStatus::InProgress;
        if in_progress {
            state.round.on_player_removed(idx, player_id, state.roster.len());
        }
        let was_drawing = state.turn.as_ref().is_some_and(|t| &t.drawer == player_id);
        player.is_drawing = false;

        let grace = CountdownTimer::with_parent(
            TimerKind::Disconnect,
            self.config.reconnect_grace,
            &self.token,
        );
        player.grace = Some(grace.clone());
        tracing::info!(
            session_id = %self.id,
            %player_id,
            grace_secs = self.config.reconnect_grace.as_secs(),
            "player disconnected, holding seat"
        );

        fx.all(ServerMessage::PlayerLeft(PlayerLeftPayload {
            player_id: player_id.clone(),
            username: player.username.clone(),
        }));
        state.parked.insert(player_id.clone(), Parked { player, slot: idx });
        fx.start(grace, TimerTarget::Grace(player_id.clone()));
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));

        if in_progress {
            if was_drawing {
                tracing::info!(session_id = %self.id, %player_id, "drawer left, ending turn");
                self.end_turn_locked(state, fx);
            } else if state.all_guessed()
                && state.turn.as_ref().is_some_and(|t| t.progress.try_complete())
            {
                self.end_turn_locked(state, fx);
            }
        }
        Ok(())
    }

    /// Restores a disconnected player to their previous roster slot with
    /// their score, colour and flags intact.
    ///
    /// # Errors
    /// [`GameError::UnknownPlayer`] if the player is not waiting to
    /// reconnect, including when their grace period ran out.
    pub async fn handle_reconnect(
        &self,
        player_id: &PlayerId,
    ) -> Result<ReconnectOutcome, GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let result = self.reconnect_locked(&mut guard, player_id, &mut fx);
        self.apply(fx).await;
        result
    }

    fn reconnect_locked(
        &self,
        state: &mut GameState,
        player_id: &PlayerId,
        fx: &mut Effects,
    ) -> Result<ReconnectOutcome, GameError> {
        if state.position(player_id).is_some() {
            tracing::debug!(session_id = %self.id, %player_id, "reconnect of active player ignored");
            return Ok(ReconnectOutcome::AlreadyActive);
        }
        match state.parked.remove(player_id) {
            Some(parked) => self.restore_locked(state, parked, fx),
            None => Err(GameError::UnknownPlayer(player_id.clone())),
        }
    }

    fn restore_locked(
        &self,
        state: &mut GameState,
        parked: Parked,
        fx: &mut Effects,
    ) -> Result<ReconnectOutcome, GameError> {
        let Parked { mut player, slot } = parked;
        if let Some(grace) = player.grace.take() {
            if !grace.stop() {
                // Grace expired; its callback is still waiting for the lock.
                let id = player.id.clone();
                self.remove_locked(state, player, fx);
                return Err(GameError::UnknownPlayer(id));
            }
        }

        let slot = slot.min(state.roster.len());
        if state.status == GameStatus::InProgress {
            state
                .round
                .on_player_inserted(slot, &player.id, player.has_drawn, state.roster.len());
        }
        tracing::info!(session_id = %self.id, player_id = %player.id, slot, "player reconnected");
        fx.all(ServerMessage::PlayerReconnected(player.view()));
        state.roster.insert(slot, player);
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));

        if state.status == GameStatus::InProgress && state.turn.is_none() {
            self.advance_locked(state, None, fx);
        }
        Ok(ReconnectOutcome::Restored)
    }

    async fn grace_expired(&self, player_id: &PlayerId) {
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let expired = state.parked.get(player_id).is_some_and(|p| {
            p.player
                .grace
                .as_ref()
                .is_some_and(|g| g.state() == TimerState::Expired)
        });
        if !expired {
            return;
        }
        if let Some(parked) = state.parked.remove(player_id) {
            self.remove_locked(state, parked.player, &mut fx);
        }
        self.apply(fx).await;
    }

    /// Drops a player for good and hands leadership on if needed.
    fn remove_locked(&self, state: &mut GameState, player: Player, fx: &mut Effects) {
        tracing::info!(session_id = %self.id, player_id = %player.id, "player removed");
        if player.is_leader {
            let next = match state.roster.first_mut() {
                Some(p) => Some(p),
                None => state
                    .parked
                    .values_mut()
                    .min_by_key(|p| p.slot)
                    .map(|p| &mut p.player),
            };
            if let Some(next) = next {
                next.is_leader = true;
                tracing::info!(session_id = %self.id, leader = %next.id, "leadership passed on");
            }
        }
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));
    }

    // -- Lobby --------------------------------------------------------------

    /// Starts the lobby countdown. A request while one is already
    /// running is ignored.
    pub async fn start_game_countdown(&self, requester: &PlayerId) -> Result<(), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        Self::require_leader(state, requester)?;
        match state.status {
            GameStatus::NotStarted => {}
            GameStatus::InProgress => return Err(GameError::AlreadyStarted),
            GameStatus::Finished => return Err(GameError::Finished),
        }
        if state
            .start_timer
            .as_ref()
            .is_some_and(|t| !t.state().is_terminal())
        {
            tracing::debug!(session_id = %self.id, "start countdown already running");
            return Ok(());
        }
        if state.roster.len() < self.config.min_players {
            return Err(GameError::NotEnoughPlayers {
                have: state.roster.len(),
                need: self.config.min_players,
            });
        }

        let timer = CountdownTimer::with_parent(
            TimerKind::StartGame,
            self.config.start_countdown,
            &self.token,
        );
        state.start_timer = Some(timer.clone());
        fx.start(timer, TimerTarget::StartGame);
        tracing::info!(session_id = %self.id, leader = %requester, "start countdown begun");
        self.apply(fx).await;
        Ok(())
    }

    /// Cancels the lobby countdown, if one is running.
    pub async fn stop_game_countdown(&self, requester: &PlayerId) -> Result<(), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        Self::require_leader(state, requester)?;
        if let Some(timer) = state.start_timer.take() {
            if timer.stop() {
                tracing::info!(session_id = %self.id, "start countdown cancelled");
                fx.all(ServerMessage::GameState(self.snapshot_of(state)));
            }
        }
        self.apply(fx).await;
        Ok(())
    }

    fn require_leader(state: &GameState, player_id: &PlayerId) -> Result<(), GameError> {
        let player = state
            .roster
            .iter()
            .find(|p| &p.id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.clone()))?;
        if player.is_leader {
            Ok(())
        } else {
            Err(GameError::NotLeader(player_id.clone()))
        }
    }

    async fn start_game(&self) -> Result<(), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.status != GameStatus::NotStarted {
            return Err(GameError::AlreadyStarted);
        }
        if state.roster.len() < self.config.min_players {
            return Err(GameError::NotEnoughPlayers {
                have: state.roster.len(),
                need: self.config.min_players,
            });
        }

        state.status = GameStatus::InProgress;
        state.start_timer = None;
        state.round = Round::new();
        state.round.begin(&mut state.roster)?;
        tracing::info!(
            session_id = %self.id,
            players = state.roster.len(),
            max_rounds = self.options.max_rounds,
            "game started"
        );
        self.begin_turn_locked(state, &mut fx)?;
        self.apply(fx).await;
        Ok(())
    }

    // -- Turns --------------------------------------------------------------

    /// Sets up a turn for the player at the round's cursor and offers
    /// them words.
    fn begin_turn_locked(&self, state: &mut GameState, fx: &mut Effects) -> Result<(), GameError> {
        let drawer = state
            .roster
            .get(state.round.drawer_idx())
            .ok_or(GameError::EmptyRoster)?
            .id
            .clone();
        state.next_generation += 1;
        let generation = state.next_generation;

        let candidates = self.draw_candidates(&state.used_words);
        state.candidates = candidates.clone();

        let timer = CountdownTimer::with_parent(
            TimerKind::SelectWord,
            secs(self.options.select_word_timer),
            &self.token,
        );
        state.turn = Some(Turn::new(generation, drawer.clone(), timer.clone()));
        tracing::info!(
            session_id = %self.id,
            %drawer,
            round = state.round.count(),
            generation,
            "turn started"
        );

        fx.to(
            &drawer,
            ServerMessage::OpenSelectWordModal(SelectableWordsPayload {
                selectable_words: candidates,
            }),
        );
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));
        fx.start(timer, TimerTarget::SelectWord { generation });
        Ok(())
    }

    fn draw_candidates(&self, used: &HashSet<String>) -> Vec<Word> {
        let count = self.options.select_word_count as usize;
        let mut seen = HashSet::new();
        self.words
            .random_words(None, count + used.len())
            .into_iter()
            .filter(|w| {
                let key = w.word.to_lowercase();
                !used.contains(&key) && seen.insert(key)
            })
            .take(count)
            .collect()
    }

    /// The drawer picks one of the offered words.
    ///
    /// # Errors
    /// [`GameError::NotDrawer`] for anyone but the drawer,
    /// [`GameError::WrongPhase`] once a word is chosen, and
    /// [`GameError::WordNotOffered`] for a word that was not a candidate.
    pub async fn select_word(&self, player_id: &PlayerId, word: &str) -> Result<(), GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.status != GameStatus::InProgress {
            return Err(GameError::WrongPhase("game is not in progress"));
        }
        let turn = state
            .turn
            .as_ref()
            .ok_or(GameError::WrongPhase("no turn in progress"))?;
        if &turn.drawer != player_id {
            return Err(GameError::NotDrawer(player_id.clone()));
        }
        if turn.phase != TurnPhase::Selecting {
            return Err(GameError::WrongPhase("word already selected"));
        }
        let chosen = state
            .candidates
            .iter()
            .find(|w| w.word.eq_ignore_ascii_case(word.trim()))
            .cloned()
            .ok_or_else(|| GameError::WordNotOffered(word.to_owned()))?;
        self.choose_word_locked(state, chosen, &mut fx);
        self.apply(fx).await;
        Ok(())
    }

    async fn select_word_expired(&self, generation: u64) {
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let current = state
            .turn
            .as_ref()
            .is_some_and(|t| t.generation == generation && t.phase == TurnPhase::Selecting);
        if !current {
            return;
        }
        match state.candidates.first().cloned() {
            Some(word) => {
                tracing::debug!(session_id = %self.id, generation, "word chosen automatically");
                self.choose_word_locked(state, word, &mut fx);
            }
            None => {
                tracing::warn!(session_id = %self.id, generation, "no words to offer, skipping turn");
                self.end_turn_locked(state, &mut fx);
            }
        }
        self.apply(fx).await;
    }

    fn choose_word_locked(&self, state: &mut GameState, word: Word, fx: &mut Effects) {
        let Some(turn) = state.turn.as_mut() else { return };
        let guess = CountdownTimer::with_parent(
            TimerKind::Guess,
            secs(self.options.turn_timer),
            &self.token,
        );
        let letters = word.word.chars().count();
        state.used_words.insert(word.word.to_lowercase());
        tracing::debug!(session_id = %self.id, generation = turn.generation, word = %word.word, "word selected");
        turn.begin_guessing(word, guess.clone());
        let generation = turn.generation;
        let drawer = turn.drawer.clone();
        state.candidates.clear();

        fx.to(&drawer, ServerMessage::CloseSelectWordModal(EmptyPayload {}));
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));
        if letters > 0 {
            fx.reveal = Some(RevealPlan {
                generation,
                letters,
                interval: secs(self.options.turn_timer) / letters as u32,
                token: guess.cancellation(),
            });
        }
        fx.start(guess, TimerTarget::Guess { generation });
    }

    /// Evaluates a guess from `player_id`.
    ///
    /// # Errors
    /// [`GameError::DrawerCannotGuess`] for the drawer and
    /// [`GameError::WrongPhase`] outside the guess phase.
    pub async fn handle_guess(
        &self,
        player_id: &PlayerId,
        guess: &str,
    ) -> Result<GuessOutcome, GameError> {
        self.ensure_open()?;
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let outcome = self.guess_locked(&mut guard, player_id, guess, &mut fx)?;
        self.apply(fx).await;
        Ok(outcome)
    }

    fn guess_locked(
        &self,
        state: &mut GameState,
        player_id: &PlayerId,
        guess: &str,
        fx: &mut Effects,
    ) -> Result<GuessOutcome, GameError> {
        let idx = state
            .position(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.clone()))?;
        if state.status != GameStatus::InProgress {
            return Err(GameError::WrongPhase("game is not in progress"));
        }
        let turn = state
            .turn
            .as_mut()
            .ok_or(GameError::WrongPhase("no turn in progress"))?;
        if &turn.drawer == player_id {
            return Err(GameError::DrawerCannotGuess);
        }
        if !turn.is_guessing() {
            return Err(GameError::WrongPhase("guessing is closed"));
        }
        if turn.guessed.contains(player_id) {
            return Ok(GuessOutcome::AlreadyGuessed);
        }
        let verdict = match &turn.word {
            Some(word) => scoring::evaluate(guess, &word.word),
            None => return Err(GameError::WrongPhase("no word selected")),
        };
        let username = state.roster[idx].username.clone();

        match verdict {
            Verdict::Exact => {
                let left = turn
                    .guessed
                    .iter()
                    .filter(|id| !state.roster.iter().any(|p| &p.id == *id))
                    .count();
                let guessers = state.roster.iter().filter(|p| p.id != turn.drawer).count();
                let Some((count, completes)) = turn.progress.record_correct(guessers + left) else {
                    return Err(GameError::WrongPhase("turn is over"));
                };
                turn.guessed.insert(player_id.clone());
                let remaining = turn.guess_remaining(self.options.turn_timer);
                let generation = turn.generation;
                let points = scoring::score_for(remaining, self.options.turn_timer);

                let player = &mut state.roster[idx];
                player.has_guessed_correctly = true;
                player.score += points;
                let score = player.score;
                tracing::info!(
                    session_id = %self.id,
                    %player_id,
                    points,
                    score,
                    correct = count,
                    "word guessed"
                );

                fx.all(ServerMessage::ScoreUpdate(ScoreUpdatePayload {
                    player_id: player_id.clone(),
                    score,
                }));
                fx.all(ServerMessage::GuessNotice(GuessPayload {
                    player_id: Some(player_id.clone()),
                    guess: format!("{username} guessed the word!"),
                    username,
                }));
                fx.all(ServerMessage::GameState(self.snapshot_of(state)));
                if completes {
                    tracing::debug!(session_id = %self.id, generation, "every guesser got it");
                    self.end_turn_locked(state, fx);
                }
                Ok(GuessOutcome::Correct { points })
            }
            Verdict::Close => {
                fx.all(ServerMessage::GuessNotice(GuessPayload {
                    player_id: Some(player_id.clone()),
                    guess: format!("{username} is close!"),
                    username,
                }));
                Ok(GuessOutcome::Close)
            }
            Verdict::Wrong => {
                fx.all(ServerMessage::PlayerGuess(GuessPayload {
                    player_id: Some(player_id.clone()),
                    username,
                    guess: guess.to_owned(),
                }));
                Ok(GuessOutcome::Wrong)
            }
        }
    }

    async fn guess_expired(&self, generation: u64) {
        let mut fx = Effects::default();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let won = state.turn.as_ref().is_some_and(|t| {
            t.generation == generation
                && t.phase == TurnPhase::Guessing
                && t.progress.try_complete()
        });
        if !won {
            return;
        }
        tracing::debug!(session_id = %self.id, generation, "guess time is up");
        self.end_turn_locked(state, &mut fx);
        self.apply(fx).await;
    }

    async fn reveal_next_letter(&self, generation: u64) -> bool {
        let mut state = self.state.write().await;
        let Some(turn) = state.turn.as_mut() else { return false };
        if turn.generation != generation || !turn.is_guessing() {
            return false;
        }
        let next = turn
            .word
            .as_ref()
            .and_then(|w| w.word.chars().nth(turn.revealed.len()));
        let Some(letter) = next else { return false };
        turn.revealed.push(letter);
        tracing::trace!(session_id = %self.id, generation, "letter revealed");
        let msg = ServerMessage::RevealedLetter(RevealedLetterPayload {
            revealed_letter: letter.to_string(),
        });
        self.send(Recipient::All, &msg).await;
        true
    }

    /// Closes the current turn and moves on to the next drawer.
    fn end_turn_locked(&self, state: &mut GameState, fx: &mut Effects) {
        let Some(mut turn) = state.turn.take() else { return };
        turn.finish();
        if let Some(drawer) = state.player_mut(&turn.drawer) {
            drawer.has_drawn = true;
            drawer.is_drawing = false;
        }
        for p in state.all_players_mut() {
            p.has_guessed_correctly = false;
        }
        state.candidates.clear();
        tracing::info!(
            session_id = %self.id,
            generation = turn.generation,
            drawer = %turn.drawer,
            correct = turn.progress.correct_count(),
            "turn ended"
        );
        self.advance_locked(state, Some(&turn.drawer), fx);
    }

    fn advance_locked(&self, state: &mut GameState, finished: Option<&PlayerId>, fx: &mut Effects) {
        match state
            .round
            .next_drawer(&mut state.roster, finished, self.options.max_rounds)
        {
            Ok(Advance::Finished) => self.finish_locked(state, fx),
            Ok(advance) => {
                if advance == Advance::NewRound {
                    for parked in state.parked.values_mut() {
                        parked.player.has_drawn = false;
                    }
                    tracing::info!(session_id = %self.id, round = state.round.count(), "round started");
                }
                if let Err(e) = self.begin_turn_locked(state, fx) {
                    tracing::warn!(session_id = %self.id, error = %e, "could not start turn");
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "no drawer available, waiting for players");
                fx.all(ServerMessage::GameState(self.snapshot_of(state)));
            }
        }
    }

    fn finish_locked(&self, state: &mut GameState, fx: &mut Effects) {
        state.status = GameStatus::Finished;
        for p in state.all_players_mut() {
            p.is_drawing = false;
        }
        tracing::info!(session_id = %self.id, rounds = state.round.count(), "game over");
        fx.all(ServerMessage::GameState(self.snapshot_of(state)));
    }

    // -- Messages -----------------------------------------------------------

    /// Dispatches one decoded client message from `player_id`.
    ///
    /// The sender is always the connection's player; any `playerId` the
    /// client put in the payload is ignored.
    pub async fn handle_message(
        &self,
        player_id: &PlayerId,
        msg: ClientMessage,
    ) -> Result<(), GameError> {
        match msg {
            ClientMessage::StartTimer(req) => match req.timer_type {
                TimerKind::StartGame => self.start_game_countdown(player_id).await,
                other => Err(GameError::UnsupportedTimer(other)),
            },
            ClientMessage::StopTimer(req) => match req.timer_type {
                TimerKind::StartGame => self.stop_game_countdown(player_id).await,
                other => Err(GameError::UnsupportedTimer(other)),
            },
            ClientMessage::SelectWord(req) => self.select_word(player_id, &req.word).await,
            ClientMessage::PlayerGuess(req) => {
                if req.player_id.as_ref().is_some_and(|claimed| claimed != player_id) {
                    tracing::debug!(
                        session_id = %self.id,
                        %player_id,
                        claimed = ?req.player_id,
                        "guess claims another player, using connection identity"
                    );
                }
                self.handle_guess(player_id, &req.guess).await.map(|_| ())
            }
            ClientMessage::Unknown(kind) => {
                tracing::debug!(session_id = %self.id, %player_id, %kind, "ignoring unknown message type");
                Ok(())
            }
        }
    }

    /// Sends one message to a single player.
    pub async fn send_to(&self, player_id: &PlayerId, msg: &ServerMessage) {
        self.send(Recipient::Player(player_id.clone()), msg).await;
    }

    // -- Shutdown -----------------------------------------------------------

    /// Stops every timer and the hub. Only the first call does anything.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.token.cancel();
        self.hub.shutdown();
        tracing::info!(session_id = %self.id, "session shut down");
    }

    fn ensure_open(&self) -> Result<(), GameError> {
        if self.is_shut_down() || self.token.is_cancelled() {
            Err(GameError::ShutDown)
        } else {
            Ok(())
        }
    }

    // -- Delivery -----------------------------------------------------------

    async fn apply(&self, fx: Effects) {
        for (to, msg) in fx.messages {
            self.send(to, &msg).await;
        }
        for (timer, target) in fx.timers {
            let kind = timer.kind();
            let hook = TimerHook { game: self.me.clone(), target };
            if let Err(e) = timer.start(hook) {
                tracing::warn!(session_id = %self.id, %kind, error = %e, "timer not started");
            }
        }
        if let Some(plan) = fx.reveal {
            tokio::spawn(reveal_letters(self.me.clone(), plan));
        }
    }

    async fn send(&self, to: Recipient, msg: &ServerMessage) {
        let frame: Frame = match self.codec.encode(msg) {
            Ok(bytes) => Arc::from(bytes),
            Err(e) => {
                tracing::warn!(session_id = %self.id, kind = msg.kind(), error = %e, "encode failed");
                return;
            }
        };
        let result = match to {
            Recipient::All => self.hub.broadcast(frame).await,
            Recipient::Player(player_id) => self.hub.send_to(player_id, frame).await,
        };
        match result {
            Ok(()) => {}
            Err(HubError::NotFound(player_id)) => {
                tracing::debug!(session_id = %self.id, %player_id, kind = msg.kind(), "player offline, unicast dropped");
            }
            Err(HubError::Closed) => {
                tracing::debug!(session_id = %self.id, kind = msg.kind(), "hub closed, message dropped");
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, kind = msg.kind(), error = %e, "delivery failed");
            }
        }
    }
}

/// Reveals the word's letters one by one until the guess timer stops.
async fn reveal_letters(game: Weak<Game>, plan: RevealPlan) {
    for _ in 0..plan.letters {
        tokio::select! {
            biased;
            () = plan.token.cancelled() => return,
            () = tokio::time::sleep(plan.interval) => {}
        }
        let Some(game) = game.upgrade() else { return };
        if !game.reveal_next_letter(plan.generation).await {
            return;
        }
    }
}

/// Connects a countdown to the session that started it.
struct TimerHook {
    game: Weak<Game>,
    target: TimerTarget,
}

impl CountdownObserver for TimerHook {
    async fn on_tick(&self, kind: TimerKind, remaining: u32) {
        let Some(msg) = ServerMessage::timer_tick(kind, remaining) else {
            return;
        };
        let Some(game) = self.game.upgrade() else { return };
        tracing::trace!(session_id = %game.id, %kind, remaining, "tick");
        game.send(Recipient::All, &msg).await;
    }

    async fn on_expire(&self, kind: TimerKind) {
        let Some(game) = self.game.upgrade() else { return };
        tracing::debug!(session_id = %game.id, %kind, "timer expired");
        match &self.target {
            TimerTarget::SelectWord { generation } => game.select_word_expired(*generation).await,
            TimerTarget::Guess { generation } => game.guess_expired(*generation).await,
            TimerTarget::StartGame => {
                if let Err(e) = game.start_game().await {
                    tracing::info!(session_id = %game.id, error = %e, "game not started");
                }
            }
            TimerTarget::Grace(player_id) => game.grace_expired(player_id).await,
        }
    }
}
