//! Integration tests for the session coordinator.
//!
//! Every test runs on a paused clock: sleeping in the test lets the
//! session's countdowns run to the chosen instant without real waiting.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scribble_game::{
    Game, GameError, GuessOutcome, ReconnectOutcome, SessionConfig, StaticWordProvider,
};
use scribble_hub::Frame;
use scribble_protocol::{
    ClientMessage, GameOptions, GameStatus, GuessPayload, PlayerId, SessionId, TimerKind,
    TimerRequestPayload,
};
use scribble_transport::ConnectionId;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: &str) -> PlayerId {
    PlayerId::from(id)
}

fn options(max_rounds: u32, turn_timer: u32, select_word_timer: u32) -> GameOptions {
    GameOptions {
        max_rounds,
        turn_timer,
        select_word_timer,
        select_word_count: 3,
    }
}

fn scenario_options() -> GameOptions {
    options(6, 15, 10)
}

fn word_list(words: &[&str]) -> Arc<StaticWordProvider> {
    Arc::new(StaticWordProvider::from_list("test", words))
}

fn default_words() -> Arc<StaticWordProvider> {
    word_list(&["apple", "guitar", "castle", "pizza", "rocket", "lantern"])
}

/// A session with players p0 (leader) .. p{n-1}.
async fn lobby_with(
    n: usize,
    options: GameOptions,
    config: SessionConfig,
    words: Arc<StaticWordProvider>,
) -> (Arc<Game>, CancellationToken) {
    let token = CancellationToken::new();
    let game = Game::new(
        SessionId::from("s1"),
        options,
        pid("p0"),
        "player0",
        config,
        words,
        &token,
    );
    for i in 1..n {
        game.add_player(PlayerId(format!("p{i}")), format!("player{i}"))
            .await
            .unwrap();
    }
    (game, token)
}

async fn lobby(n: usize, options: GameOptions) -> (Arc<Game>, CancellationToken) {
    lobby_with(n, options, SessionConfig::default(), default_words()).await
}

/// Runs the leader's start countdown to completion.
async fn start(game: &Game) {
    game.start_game_countdown(&pid("p0")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(game.status().await, GameStatus::InProgress);
}

/// The drawer picks the first offered word; returns it.
async fn select_first(game: &Game, drawer: &str) -> String {
    let candidates = game.selectable_words().await;
    let word = candidates.first().expect("no candidates offered").word.clone();
    game.select_word(&pid(drawer), &word).await.unwrap();
    word
}

async fn connect(game: &Game, conn: u64, player: &str) -> mpsc::Receiver<Frame> {
    game.hub()
        .register(ConnectionId::new(conn), pid(player))
        .await
        .unwrap()
}

/// Everything queued for a connection so far, as JSON.
async fn drain(game: &Game, rx: &mut mpsc::Receiver<Frame>) -> Vec<Value> {
    // The hub handles commands in order, so this waits for earlier sends.
    game.hub().clients().await.unwrap();
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(serde_json::from_slice(&frame).unwrap());
    }
    out
}

fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == kind).collect()
}

async fn current_drawer(game: &Game) -> Option<PlayerId> {
    game.snapshot().await.round.current_drawer
}

// =========================================================================
// Lobby
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_add_player_assigns_unique_colours_and_announces() {
    let (game, _token) = lobby(1, GameOptions::default()).await;
    let mut rx = connect(&game, 1, "p0").await;

    let view = game.add_player(pid("p1"), "ana").await.unwrap();
    assert_eq!(view.color, "#33FF57");
    assert!(!view.is_leader);

    let frames = drain(&game, &mut rx).await;
    let joined = of_type(&frames, "playerJoined");
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0]["payload"]["playerId"], "p1");
    assert_eq!(of_type(&frames, "gameState").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_player_duplicate_id_is_rejected() {
    let (game, _token) = lobby(2, GameOptions::default()).await;
    let err = game.add_player(pid("p1"), "again").await.unwrap_err();
    assert!(matches!(err, GameError::DuplicatePlayer(p) if p == pid("p1")));
}

#[tokio::test(start_paused = true)]
async fn test_add_player_respects_player_cap() {
    let config = SessionConfig { max_players: 2, ..SessionConfig::default() };
    let (game, _token) = lobby_with(2, GameOptions::default(), config, default_words()).await;
    let err = game.add_player(pid("p2"), "late").await.unwrap_err();
    assert!(matches!(err, GameError::SessionFull(2)));
}

#[tokio::test(start_paused = true)]
async fn test_add_player_after_start_is_rejected() {
    let (game, _token) = lobby(2, scenario_options()).await;
    start(&game).await;
    let err = game.add_player(pid("p9"), "late").await.unwrap_err();
    assert!(matches!(err, GameError::AlreadyStarted));
}

#[tokio::test(start_paused = true)]
async fn test_start_countdown_only_leader() {
    let (game, _token) = lobby(2, GameOptions::default()).await;
    let err = game.start_game_countdown(&pid("p1")).await.unwrap_err();
    assert!(matches!(err, GameError::NotLeader(_)));
    assert_eq!(err.code(), 403);
}

#[tokio::test(start_paused = true)]
async fn test_start_countdown_needs_two_players() {
    let (game, _token) = lobby(1, GameOptions::default()).await;
    let err = game.start_game_countdown(&pid("p0")).await.unwrap_err();
    assert!(matches!(err, GameError::NotEnoughPlayers { have: 1, need: 2 }));
}

#[tokio::test(start_paused = true)]
async fn test_start_countdown_ticks_then_starts_first_turn() {
    let (game, _token) = lobby(2, scenario_options()).await;
    let mut leader = connect(&game, 1, "p0").await;
    let mut guest = connect(&game, 2, "p1").await;

    start(&game).await;

    let frames = drain(&game, &mut guest).await;
    let ticks: Vec<u64> = of_type(&frames, "startGameTimer")
        .iter()
        .map(|f| f["payload"]["timeRemaining"].as_u64().unwrap())
        .collect();
    assert_eq!(ticks, vec![5, 4, 3, 2, 1]);
    assert!(of_type(&frames, "openSelectWordModal").is_empty());

    let last_state = of_type(&frames, "gameState").pop().unwrap().clone();
    assert_eq!(last_state["payload"]["status"], "inProgress");
    assert_eq!(last_state["payload"]["round"]["currentDrawer"], "p0");
    assert_eq!(last_state["payload"]["isSelectingWord"], true);

    let frames = drain(&game, &mut leader).await;
    let modal = of_type(&frames, "openSelectWordModal");
    assert_eq!(modal.len(), 1);
    assert_eq!(
        modal[0]["payload"]["selectableWords"].as_array().unwrap().len(),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_start_request_is_ignored() {
    let (game, _token) = lobby(2, scenario_options()).await;
    let mut rx = connect(&game, 1, "p1").await;

    game.start_game_countdown(&pid("p0")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    game.start_game_countdown(&pid("p0")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_000)).await;

    assert_eq!(game.status().await, GameStatus::InProgress);
    let frames = drain(&game, &mut rx).await;
    assert_eq!(of_type(&frames, "startGameTimer").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stop_countdown_keeps_lobby_open() {
    let (game, _token) = lobby(2, scenario_options()).await;

    game.start_game_countdown(&pid("p0")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    game.stop_game_countdown(&pid("p0")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(game.status().await, GameStatus::NotStarted);
    game.add_player(pid("p2"), "still open").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_client_cannot_control_turn_timers() {
    let (game, _token) = lobby(2, scenario_options()).await;
    let msg = ClientMessage::StartTimer(TimerRequestPayload { timer_type: TimerKind::Guess });
    let err = game.handle_message(&pid("p0"), msg).await.unwrap_err();
    assert!(matches!(err, GameError::UnsupportedTimer(TimerKind::Guess)));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_message_is_ignored() {
    let (game, _token) = lobby(2, scenario_options()).await;
    let msg = ClientMessage::Unknown("drawStroke".into());
    game.handle_message(&pid("p1"), msg).await.unwrap();
    assert_eq!(game.status().await, GameStatus::NotStarted);
}

// =========================================================================
// Word selection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_word_only_by_drawer_and_only_offered_words() {
    let (game, _token) = lobby(3, scenario_options()).await;
    start(&game).await;
    let offered = game.selectable_words().await;

    let err = game.select_word(&pid("p1"), &offered[0].word).await.unwrap_err();
    assert!(matches!(err, GameError::NotDrawer(_)));

    let not_offered = ["apple", "guitar", "castle", "pizza", "rocket", "lantern"]
        .into_iter()
        .find(|w| offered.iter().all(|o| o.word != *w))
        .unwrap();
    let err = game.select_word(&pid("p0"), not_offered).await.unwrap_err();
    assert!(matches!(err, GameError::WordNotOffered(_)));

    game.select_word(&pid("p0"), &offered[1].word).await.unwrap();
    assert_eq!(game.current_word().await, Some(offered[1].word.clone()));
    assert!(game.selectable_words().await.is_empty());

    let err = game.select_word(&pid("p0"), &offered[0].word).await.unwrap_err();
    assert!(matches!(err, GameError::WrongPhase(_)));
}

#[tokio::test(start_paused = true)]
async fn test_select_word_closes_modal_and_hides_word() {
    let (game, _token) = lobby(2, scenario_options()).await;
    start(&game).await;
    let mut drawer = connect(&game, 1, "p0").await;
    let mut guesser = connect(&game, 2, "p1").await;

    let word = select_first(&game, "p0").await;

    let frames = drain(&game, &mut drawer).await;
    assert_eq!(of_type(&frames, "closeSelectWordModal").len(), 1);

    let frames = drain(&game, &mut guesser).await;
    assert!(of_type(&frames, "closeSelectWordModal").is_empty());
    let state = of_type(&frames, "gameState").pop().unwrap().clone();
    assert_eq!(state["payload"]["wordLength"], word.chars().count());
    assert_eq!(state["payload"]["isSelectingWord"], false);
    assert!(!state.to_string().contains(&format!("\"{word}\"")));
}

#[tokio::test(start_paused = true)]
async fn test_select_word_timer_expiry_picks_first_candidate() {
    let (game, _token) = lobby(2, scenario_options()).await;
    start(&game).await;
    let first = game.selectable_words().await[0].word.clone();

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(game.current_word().await, Some(first));
    assert_eq!(current_drawer(&game).await, Some(pid("p0")));
}

#[tokio::test(start_paused = true)]
async fn test_words_are_not_offered_twice() {
    let words = word_list(&["apple", "guitar", "castle", "pizza"]);
    let (game, _token) =
        lobby_with(2, options(3, 5, 3), SessionConfig::default(), words).await;
    start(&game).await;
    let first = select_first(&game, "p0").await;

    game.handle_guess(&pid("p1"), &first).await.unwrap();

    let offered: HashSet<String> = game
        .selectable_words()
        .await
        .into_iter()
        .map(|w| w.word)
        .collect();
    assert_eq!(offered.len(), 3);
    assert!(!offered.contains(&first));
}

// =========================================================================
// Guessing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_all_guessers_correct_passes_turn_to_next_player() {
    let (game, _token) = lobby(4, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;

    for guesser in ["p1", "p2", "p3"] {
        let outcome = game.handle_guess(&pid(guesser), &word).await.unwrap();
        assert_eq!(outcome, GuessOutcome::Correct { points: 150 });
    }

    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
    assert_eq!(game.drawn_this_round().await, HashSet::from([pid("p0")]));
    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.round.count, 1);
    assert!(snapshot.is_selecting_word);
    assert!(snapshot.players.iter().all(|p| !p.has_guessed_correctly));
    let scores: Vec<i32> = snapshot.players.iter().map(|p| p.score).collect();
    assert_eq!(scores, vec![0, 150, 150, 150]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_correct_guesses_advance_exactly_once() {
    let (game, _token) = lobby(4, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;

    let tasks: Vec<_> = ["p1", "p2", "p3"]
        .into_iter()
        .map(|p| {
            let game = Arc::clone(&game);
            let word = word.clone();
            tokio::spawn(async move { game.handle_guess(&pid(p), &word).await })
        })
        .collect();
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, GuessOutcome::Correct { .. }));
    }

    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
    assert_eq!(game.drawn_this_round().await, HashSet::from([pid("p0")]));
}

#[tokio::test(start_paused = true)]
async fn test_close_guess_sends_notice_without_text() {
    let words = word_list(&["elephant"]);
    let (game, _token) =
        lobby_with(3, scenario_options(), SessionConfig::default(), words).await;
    start(&game).await;
    select_first(&game, "p0").await;
    let mut rx = connect(&game, 1, "p2").await;

    let outcome = game.handle_guess(&pid("p1"), "elephent").await.unwrap();
    assert_eq!(outcome, GuessOutcome::Close);

    let frames = drain(&game, &mut rx).await;
    let notices = of_type(&frames, "player_guess");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["payload"]["guess"], "player1 is close!");
    assert!(of_type(&frames, "playerGuess").is_empty());
    assert!(frames.iter().all(|f| !f.to_string().contains("elephent")));

    let guesser = game.player(&pid("p1")).await.unwrap();
    assert!(!guesser.has_guessed_correctly);
    assert_eq!(guesser.score, 0);
    assert_eq!(current_drawer(&game).await, Some(pid("p0")));
}

#[tokio::test(start_paused = true)]
async fn test_wrong_guess_is_relayed_verbatim() {
    let words = word_list(&["elephant"]);
    let (game, _token) =
        lobby_with(2, scenario_options(), SessionConfig::default(), words).await;
    start(&game).await;
    select_first(&game, "p0").await;
    let mut rx = connect(&game, 1, "p0").await;

    let msg = ClientMessage::PlayerGuess(GuessPayload {
        player_id: Some(pid("p0")),
        username: "impostor".into(),
        guess: "giraffe".into(),
    });
    game.handle_message(&pid("p1"), msg).await.unwrap();

    let frames = drain(&game, &mut rx).await;
    let relayed = of_type(&frames, "playerGuess");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0]["payload"]["playerId"], "p1");
    assert_eq!(relayed[0]["payload"]["username"], "player1");
    assert_eq!(relayed[0]["payload"]["guess"], "giraffe");
}

#[tokio::test(start_paused = true)]
async fn test_correct_guess_is_scored_once() {
    let (game, _token) = lobby(3, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;

    assert!(matches!(
        game.handle_guess(&pid("p1"), &word).await.unwrap(),
        GuessOutcome::Correct { .. }
    ));
    assert_eq!(
        game.handle_guess(&pid("p1"), &word.to_uppercase()).await.unwrap(),
        GuessOutcome::AlreadyGuessed
    );
    assert_eq!(game.player(&pid("p1")).await.unwrap().score, 150);
}

#[tokio::test(start_paused = true)]
async fn test_score_drops_with_time_left() {
    let (game, _token) = lobby(3, options(3, 15, 10)).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    let outcome = game.handle_guess(&pid("p1"), &word).await.unwrap();

    // 10 seconds left of 15: 100 + floor(50 * 10 / 15).
    assert_eq!(outcome, GuessOutcome::Correct { points: 133 });
}

#[tokio::test(start_paused = true)]
async fn test_drawer_cannot_guess() {
    let (game, _token) = lobby(2, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;
    let err = game.handle_guess(&pid("p0"), &word).await.unwrap_err();
    assert!(matches!(err, GameError::DrawerCannotGuess));
}

#[tokio::test(start_paused = true)]
async fn test_guess_before_word_selected_is_rejected() {
    let (game, _token) = lobby(2, scenario_options()).await;
    start(&game).await;
    let err = game.handle_guess(&pid("p1"), "apple").await.unwrap_err();
    assert!(matches!(err, GameError::WrongPhase(_)));
}

#[tokio::test(start_paused = true)]
async fn test_guess_timer_expiry_ends_turn() {
    let (game, _token) = lobby(3, options(3, 15, 10)).await;
    start(&game).await;
    select_first(&game, "p0").await;

    tokio::time::sleep(Duration::from_secs(16)).await;

    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
    assert_eq!(game.drawn_this_round().await, HashSet::from([pid("p0")]));
    assert_eq!(game.current_word().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_letters_are_revealed_during_guessing() {
    let words = word_list(&["elephant"]);
    let (game, _token) = lobby_with(2, options(3, 16, 10), SessionConfig::default(), words).await;
    start(&game).await;
    let mut rx = connect(&game, 1, "p1").await;
    select_first(&game, "p0").await;

    // 8 letters over 16 seconds: one every 2 seconds.
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    assert_eq!(game.snapshot().await.revealed_letters, vec!['e', 'l']);
    let frames = drain(&game, &mut rx).await;
    let letters: Vec<&str> = of_type(&frames, "revealedLetter")
        .iter()
        .map(|f| f["payload"]["revealedLetter"].as_str().unwrap())
        .collect();
    assert_eq!(letters, vec!["e", "l"]);
}

#[tokio::test(start_paused = true)]
async fn test_every_letter_is_revealed_before_time_is_up() {
    let words = word_list(&["cat"]);
    let (game, _token) = lobby_with(2, options(3, 10, 10), SessionConfig::default(), words).await;
    start(&game).await;
    let mut rx = connect(&game, 1, "p1").await;
    select_first(&game, "p0").await;

    tokio::time::sleep(Duration::from_secs(11)).await;

    let frames = drain(&game, &mut rx).await;
    let letters: Vec<&str> = of_type(&frames, "revealedLetter")
        .iter()
        .map(|f| f["payload"]["revealedLetter"].as_str().unwrap())
        .collect();
    assert_eq!(letters, vec!["c", "a", "t"]);
    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
}

#[tokio::test(start_paused = true)]
async fn test_game_finishes_after_last_round() {
    let (game, _token) = lobby(2, options(1, 5, 3)).await;
    start(&game).await;

    // Two turns of at most 3 + 5 seconds each.
    tokio::time::sleep(Duration::from_secs(20)).await;

    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.status, GameStatus::Finished);
    assert_eq!(snapshot.round.current_drawer, None);
    assert_eq!(snapshot.round.count, 1);
    let err = game.add_player(pid("late"), "late").await.unwrap_err();
    assert!(matches!(err, GameError::Finished));
}

// =========================================================================
// Disconnect and reconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_parks_player_and_announces() {
    let (game, _token) = lobby(3, GameOptions::default()).await;
    let mut rx = connect(&game, 1, "p0").await;

    game.handle_disconnect(&pid("p1")).await.unwrap();

    assert!(game.is_disconnected(&pid("p1")).await);
    let ids: Vec<_> = game.snapshot().await.players.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![pid("p0"), pid("p2")]);

    let frames = drain(&game, &mut rx).await;
    let left = of_type(&frames, "player_left");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["payload"]["username"], "player1");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_restores_player() {
    let (game, _token) = lobby(3, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;
    game.handle_guess(&pid("p2"), &word).await.unwrap();
    let before = game.player(&pid("p2")).await.unwrap();

    game.handle_disconnect(&pid("p2")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    let outcome = game.handle_reconnect(&pid("p2")).await.unwrap();

    assert_eq!(outcome, ReconnectOutcome::Restored);
    let after = game.player(&pid("p2")).await.unwrap();
    assert_eq!(after.score, before.score);
    assert_eq!(after.color, before.color);
    assert_eq!(after.username, before.username);
    let ids: Vec<_> = game.snapshot().await.players.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![pid("p0"), pid("p1"), pid("p2")]);
    assert!(!game.is_disconnected(&pid("p2")).await);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_grace_fails() {
    let (game, _token) = lobby(3, GameOptions::default()).await;

    game.handle_disconnect(&pid("p1")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(!game.is_disconnected(&pid("p1")).await);
    assert!(game.player(&pid("p1")).await.is_none());
    let err = game.handle_reconnect(&pid("p1")).await.unwrap_err();
    assert!(matches!(err, GameError::UnknownPlayer(_)));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_active_player_is_noop() {
    let (game, _token) = lobby(2, GameOptions::default()).await;
    let outcome = game.handle_reconnect(&pid("p1")).await.unwrap();
    assert_eq!(outcome, ReconnectOutcome::AlreadyActive);
    assert_eq!(game.snapshot().await.players.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_bind_after_last_release_restores_player() {
    let (game, _token) = lobby(2, GameOptions::default()).await;
    let (_, _first) = game.bind(ConnectionId::new(1), &pid("p1")).await.unwrap();

    assert_eq!(game.release(ConnectionId::new(1), &pid("p1")).await.unwrap(), 0);
    assert!(game.is_disconnected(&pid("p1")).await);

    let (outcome, _second) = game.bind(ConnectionId::new(2), &pid("p1")).await.unwrap();
    assert_eq!(outcome, ReconnectOutcome::Restored);

    // The grace period has long passed; the player stays.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!game.is_disconnected(&pid("p1")).await);
    assert!(game.player(&pid("p1")).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_release_with_another_connection_bound_keeps_player() {
    let (game, _token) = lobby(2, GameOptions::default()).await;
    let (_, _first) = game.bind(ConnectionId::new(1), &pid("p1")).await.unwrap();
    let (outcome, _second) = game.bind(ConnectionId::new(2), &pid("p1")).await.unwrap();
    assert_eq!(outcome, ReconnectOutcome::AlreadyActive);

    assert_eq!(game.release(ConnectionId::new(1), &pid("p1")).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!game.is_disconnected(&pid("p1")).await);
    assert!(game.player(&pid("p1")).await.is_some());
    let clients = game.hub().clients().await.unwrap();
    assert_eq!(clients, vec![(ConnectionId::new(2), pid("p1"))]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_release_and_bind_leave_player_online() {
    for _ in 0..50 {
        let (game, token) = lobby(2, GameOptions::default()).await;
        let (_, _first) = game.bind(ConnectionId::new(1), &pid("p1")).await.unwrap();

        let release = {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.release(ConnectionId::new(1), &pid("p1")).await })
        };
        let bind = {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.bind(ConnectionId::new(2), &pid("p1")).await })
        };
        let remaining = release.await.unwrap().unwrap();
        let (outcome, _second) = bind.await.unwrap().unwrap();

        // Either order is fine as long as the two never interleave.
        assert!(matches!(
            (remaining, outcome),
            (0, ReconnectOutcome::Restored) | (1, ReconnectOutcome::AlreadyActive)
        ));
        assert!(!game.is_disconnected(&pid("p1")).await);
        assert!(game.player(&pid("p1")).await.is_some());
        let clients = game.hub().clients().await.unwrap();
        assert_eq!(clients, vec![(ConnectionId::new(2), pid("p1"))]);
        token.cancel();
    }
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_player_keeps_colour_reserved() {
    let (game, _token) = lobby(3, GameOptions::default()).await;
    let parked_colour = game.player(&pid("p1")).await.unwrap().color;

    game.handle_disconnect(&pid("p1")).await.unwrap();
    let newcomer = game.add_player(pid("p3"), "newcomer").await.unwrap();

    assert_ne!(newcomer.color, parked_colour);
    let err = game.add_player(pid("p1"), "imposter").await.unwrap_err();
    assert!(matches!(err, GameError::DuplicatePlayer(_)));
}

#[tokio::test(start_paused = true)]
async fn test_leader_removal_promotes_first_player() {
    let (game, _token) = lobby(3, GameOptions::default()).await;

    game.handle_disconnect(&pid("p0")).await.unwrap();
    assert!(!game.player(&pid("p1")).await.unwrap().is_leader);

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(game.player(&pid("p1")).await.unwrap().is_leader);
    assert!(!game.player(&pid("p2")).await.unwrap().is_leader);
}

#[tokio::test(start_paused = true)]
async fn test_drawer_disconnect_passes_turn() {
    let (game, _token) = lobby(3, scenario_options()).await;
    start(&game).await;
    select_first(&game, "p0").await;

    game.handle_disconnect(&pid("p0")).await.unwrap();

    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
    assert!(game.snapshot().await.is_selecting_word);
}

#[tokio::test(start_paused = true)]
async fn test_last_guesser_leaving_completes_turn() {
    let (game, _token) = lobby(3, scenario_options()).await;
    start(&game).await;
    let word = select_first(&game, "p0").await;
    game.handle_guess(&pid("p1"), &word).await.unwrap();

    game.handle_disconnect(&pid("p2")).await.unwrap();

    assert_eq!(current_drawer(&game).await, Some(pid("p1")));
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_end_on_current_game_state() {
    for _ in 0..20 {
        let (game, token) = lobby(1, GameOptions::default()).await;
        let (_, mut rx) = game.bind(ConnectionId::new(1), &pid("p0")).await.unwrap();

        let joins: Vec<_> = (1..8)
            .map(|i| {
                let game = Arc::clone(&game);
                tokio::spawn(async move {
                    game.add_player(PlayerId(format!("p{i}")), format!("player{i}"))
                        .await
                })
            })
            .collect();
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let frames = drain(&game, &mut rx).await;
        let states = of_type(&frames, "gameState");
        let counts: Vec<usize> = states
            .iter()
            .map(|f| f["payload"]["players"].as_array().unwrap().len())
            .collect();
        assert_eq!(counts, (1..=8).collect::<Vec<_>>());
        let last = states.last().unwrap();
        assert_eq!(last["payload"], serde_json::to_value(game.snapshot().await).unwrap());
        token.cancel();
    }
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_session() {
    let (game, _token) = lobby(2, scenario_options()).await;
    let mut rx = connect(&game, 1, "p1").await;
    game.start_game_countdown(&pid("p0")).await.unwrap();

    game.shutdown();
    game.shutdown();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(game.is_shut_down());
    assert!(game.hub().is_closed());
    assert_eq!(game.status().await, GameStatus::NotStarted);
    while rx.recv().await.is_some() {}
    let err = game.add_player(pid("p2"), "late").await.unwrap_err();
    assert!(matches!(err, GameError::ShutDown));
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_timers() {
    let (game, token) = lobby(2, scenario_options()).await;
    game.start_game_countdown(&pid("p0")).await.unwrap();

    token.cancel();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(game.status().await, GameStatus::NotStarted);
}
