//! `QuizforgeServer` builder and accept loop.
//!
//! Ties the layers together: socket → protocol → session → lobby. One
//! handler task per connection, one relay actor per room, plus a
//! periodic sweep that expires stale sessions and evicts idle rooms.

use std::sync::Arc;
use std::time::Duration;

use quizforge_lobby::{AnswerChecker, LobbyConfig, LobbyRegistry, QuestionSource};
use quizforge_protocol::{Codec, JsonCodec};
use quizforge_session::{Authenticator, SessionConfig, SessionManager};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::handler::handle_connection;
use crate::ws::WsListener;
use crate::QuizforgeError;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// How often the sweep task expires sessions and evicts idle rooms.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: Mutex<LobbyRegistry>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    /// Envelope timestamps are milliseconds since this instant.
    pub(crate) started_at: Instant,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    pub(crate) fn now_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Quizforge server.
///
/// # Example
///
/// ```rust,ignore
/// let server = QuizforgeServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(MyAuth, source, checker)
///     .await?;
/// server.run().await
/// ```
pub struct QuizforgeServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    lobby_config: LobbyConfig,
}

impl QuizforgeServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            lobby_config: LobbyConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration (grace period).
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the lobby configuration (budgets, rewards, thresholds).
    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.lobby_config = config;
        self
    }

    /// Builds the server with the given authenticator and content
    /// seams. Uses `JsonCodec` (MVP default).
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
        source: Arc<dyn QuestionSource>,
        checker: Arc<dyn AnswerChecker>,
    ) -> Result<QuizforgeServer<A, JsonCodec>, QuizforgeError> {
        let listener = WsListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            registry: Mutex::new(LobbyRegistry::new(self.lobby_config, source, checker)),
            auth,
            codec: JsonCodec,
            started_at: Instant::now(),
        });

        Ok(QuizforgeServer { listener, state })
    }
}

impl Default for QuizforgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A running Quizforge lobby server.
pub struct QuizforgeServer<A: Authenticator, C: Codec> {
    listener: WsListener,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> QuizforgeServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    pub fn builder() -> QuizforgeServerBuilder {
        QuizforgeServerBuilder::new()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop (and the sweep task) until the process is
    /// terminated.
    pub async fn run(self) -> Result<(), QuizforgeError> {
        tracing::info!("quizforge server running");

        tokio::spawn(sweep_loop(Arc::clone(&self.state)));

        loop {
            match self.listener.accept().await {
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
            }
        }
    }
}

/// Periodic maintenance: expire sessions whose grace period elapsed,
/// remove those players from their rooms, and evict idle rooms.
async fn sweep_loop<A: Authenticator, C: Codec>(state: Arc<ServerState<A, C>>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;

        let expired = {
            let mut sessions = state.sessions.lock().await;
            let expired = sessions.expire_stale();
            sessions.cleanup_expired();
            expired
        };

        let mut registry = state.registry.lock().await;
        for player_id in expired {
            // The session is gone for good; free the roster slot so
            // the turn rotation stops carrying a permanent ghost.
            if registry.room_of(&player_id).is_some() {
                if let Err(e) = registry.leave(player_id).await {
                    tracing::debug!(%player_id, error = %e, "expired player leave failed");
                }
            }
        }

        let evicted = registry.evict_idle().await;
        if !evicted.is_empty() {
            tracing::info!(rooms = evicted.len(), "idle rooms evicted");
        }
    }
}
