//! Integration tests for the session registry.

use std::sync::Arc;
use std::time::Duration;

use scribble_game::{RegistryError, SessionConfig, SessionRegistry, StaticWordProvider};
use scribble_protocol::{GameOptions, GameStatus, PlayerId, SessionId};

fn pid(id: &str) -> PlayerId {
    PlayerId::from(id)
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(
        SessionConfig::default(),
        Arc::new(StaticWordProvider::default()),
    )
}

#[tokio::test]
async fn test_create_game_registers_leader() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;

    assert_eq!(id.as_str().len(), 32);
    assert_eq!(registry.len().await, 1);
    let game = registry.get(&id).await.unwrap();
    let snapshot = game.snapshot().await;
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.status, GameStatus::NotStarted);
    assert_eq!(snapshot.players.len(), 1);
    assert!(snapshot.players[0].is_leader);
}

#[tokio::test]
async fn test_create_game_clamps_options() {
    let registry = registry();
    let options = GameOptions { max_rounds: 99, ..GameOptions::default() };
    let id = registry.create_game(options, pid("host"), "Host").await;
    let game = registry.get(&id).await.unwrap();
    assert_eq!(game.options().max_rounds, 10);
}

#[tokio::test]
async fn test_join_game_adds_player() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;

    let view = registry.join_game(&id, pid("p1"), "Ana").await.unwrap();

    assert_eq!(view.username, "Ana");
    let game = registry.get(&id).await.unwrap();
    assert_eq!(game.snapshot().await.players.len(), 2);
}

#[tokio::test]
async fn test_join_unknown_session_is_not_found() {
    let registry = registry();
    let err = registry
        .join_game(&SessionId::from("missing"), pid("p1"), "Ana")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_join_duplicate_player_is_conflict() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;

    let err = registry.join_game(&id, pid("host"), "Again").await.unwrap_err();
    assert!(matches!(err, RegistryError::DuplicatePlayer(..)));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_join_full_session_is_forbidden() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;
    for i in 1..8 {
        registry
            .join_game(&id, PlayerId(format!("p{i}")), format!("player{i}"))
            .await
            .unwrap();
    }

    let err = registry.join_game(&id, pid("p8"), "ninth").await.unwrap_err();
    assert!(matches!(err, RegistryError::Full(_)));
    assert_eq!(err.status_code(), 403);
}

#[tokio::test(start_paused = true)]
async fn test_join_in_progress_is_forbidden() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;
    registry.join_game(&id, pid("p1"), "Ana").await.unwrap();
    let game = registry.get(&id).await.unwrap();
    game.start_game_countdown(&pid("host")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let err = registry.join_game(&id, pid("p2"), "Bo").await.unwrap_err();
    assert!(matches!(err, RegistryError::InProgress(_)));
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_remove_game_shuts_session_down() {
    let registry = registry();
    let id = registry
        .create_game(GameOptions::default(), pid("host"), "Host")
        .await;
    let game = registry.get(&id).await.unwrap();

    assert!(registry.remove_game(&id).await);
    assert!(!registry.remove_game(&id).await);

    assert!(game.is_shut_down());
    assert!(registry.get(&id).await.is_none());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_shutdown_stops_every_session() {
    let registry = registry();
    let a = registry
        .create_game(GameOptions::default(), pid("a"), "A")
        .await;
    let b = registry
        .create_game(GameOptions::default(), pid("b"), "B")
        .await;
    assert_ne!(a, b);
    let games = [registry.get(&a).await.unwrap(), registry.get(&b).await.unwrap()];

    registry.shutdown().await;

    assert!(registry.is_empty().await);
    assert!(games.iter().all(|g| g.is_shut_down()));
}
