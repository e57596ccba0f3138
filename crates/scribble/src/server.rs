//! `ScribbleServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → registry → game.

use std::sync::Arc;
use std::time::Duration;

use scribble_game::SessionRegistry;
use scribble_protocol::JsonCodec;
use scribble_transport::{Transport, WebSocketTransport};
use tokio_util::sync::CancellationToken;

use crate::ScribbleError;
use crate::handler::handle_connection;

/// Connection-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// A connection that sends nothing for this long is closed and its
    /// player parked.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Raises a too-short idle timeout to one second.
    pub fn validated(mut self) -> Self {
        if self.idle_timeout < Self::MIN_IDLE_TIMEOUT {
            tracing::warn!(requested = ?self.idle_timeout, "idle_timeout too short, using 1s");
            self.idle_timeout = Self::MIN_IDLE_TIMEOUT;
        }
        self
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) config: ServerConfig,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a Scribble server.
///
/// # Example
///
/// ```rust,ignore
/// use scribble::prelude::*;
///
/// let registry = Arc::new(SessionRegistry::default());
/// let server = ScribbleServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(registry)
///     .await?;
/// server.run().await
/// ```
pub struct ScribbleServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl ScribbleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the connection configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and returns a server serving `registry`.
    pub async fn build(
        self,
        registry: Arc<SessionRegistry>,
    ) -> Result<ScribbleServer, ScribbleError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry,
            config: self.config.validated(),
            codec: JsonCodec,
        });

        Ok(ScribbleServer {
            transport,
            state,
            token: CancellationToken::new(),
        })
    }
}

impl Default for ScribbleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Scribble server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ScribbleServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    token: CancellationToken,
}

impl ScribbleServer {
    /// Creates a new builder.
    pub fn builder() -> ScribbleServerBuilder {
        ScribbleServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry connections are routed into.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Token that stops [`run()`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs the accept loop until the shutdown token is cancelled, then
    /// shuts every session down.
    pub async fn run(mut self) -> Result<(), ScribbleError> {
        let addr = self.local_addr().ok();
        tracing::info!(?addr, "Scribble server running");
        let token = self.token.clone();

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.state.registry.shutdown().await;
        tracing::info!("Scribble server stopped");
        Ok(())
    }
}
