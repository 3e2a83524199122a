//! Session types: the server's record of a connected player.

use std::time::Instant;

use quizforge_protocol::PlayerId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected player has to reconnect
    /// before their session is permanently expired.
    ///
    /// Default: 60 seconds — comfortably longer than the lobby's
    /// reconnection-supervisor wait, so a player whose turn was skipped
    /// can still rejoin as a spectator of their own game. Set to 0 to
    /// disable reconnection entirely.
    pub reconnect_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { reconnect_grace_secs: 60 }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The connection state of a player's session.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
///
/// `Instant` is the monotonic clock — elapsed-time checks are immune to
/// wall-clock adjustments.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Player is actively connected.
    Connected,

    /// Player lost their socket at `since`; they have until
    /// `since + grace` to present their reconnect token.
    Disconnected { since: Instant },

    /// Grace period elapsed. The session is dead and will be cleaned
    /// up; the player must authenticate again.
    Expired,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single player's session on the server.
///
/// Created on successful authentication; survives socket drops for the
/// grace period so a flaky network doesn't eject a player mid-game.
#[derive(Debug, Clone)]
pub struct Session {
    /// Which player this session belongs to.
    pub player_id: PlayerId,

    /// The name shown to other players in the `users` roster.
    pub display_name: String,

    /// Current connection state.
    pub state: SessionState,

    /// When this player was last seen alive: connection, heartbeat, or
    /// any processed message refreshes it.
    pub last_seen_at: Instant,

    /// A secret the client can present to resume this session after a
    /// socket drop. 32 hex chars (128 bits); sent once in the
    /// handshake ack.
    pub reconnect_token: String,
}
