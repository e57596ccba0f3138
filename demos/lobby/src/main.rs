use std::sync::Arc;

use scribble::prelude::*;

// ---------------------------------------------------------------------------
// Demo lobby: one session with two seats, ready for two browser tabs.
//
//   ws://127.0.0.1:8080/game/{sessionId}?playerId=host
//   ws://127.0.0.1:8080/game/{sessionId}?playerId=guest
//
// Set SCRIBBLE_BIND to listen elsewhere and RUST_LOG to change verbosity.
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    scribble::init_tracing();

    let bind = std::env::var("SCRIBBLE_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let registry = Arc::new(SessionRegistry::default());
    let options = GameOptions {
        max_rounds: 2,
        turn_timer: 45,
        ..GameOptions::default()
    };
    let session = registry
        .create_game(options, PlayerId::from("host"), "Host")
        .await;
    registry
        .join_game(&session, PlayerId::from("guest"), "Guest")
        .await?;

    let server = ScribbleServer::builder()
        .bind(&bind)
        .build(registry)
        .await?;
    let addr = server.local_addr()?;
    tracing::info!(%session, "lobby ready at ws://{addr}/game/{session}?playerId=host");

    let token = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
