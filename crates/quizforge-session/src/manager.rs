//! The session manager: tracks every player identity the server knows.
//!
//! Responsibilities:
//! - Creating sessions when players authenticate
//! - Tracking who is connected / recently disconnected
//! - Validating reconnection tokens
//! - Expiring sessions after the grace period, then cleaning them up
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself — it uses a plain
//! `HashMap`. The server owns it behind a single `Mutex` at a higher
//! level; keeping this type simple avoids hidden locking overhead.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use quizforge_protocol::PlayerId;
use rand::Rng;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Manages all active player sessions.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ disconnect() ──→ reconnect()
///    │               │               │
///    │               ▼               │
///    │          expire_stale()       │
///    ▼               │               ▼
/// [Connected]   [Disconnected]  [Connected]
///                    │
///                    ▼ (after grace period)
///                [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    /// All sessions, keyed by player id. A player has at most one.
    sessions: HashMap<PlayerId, Session>,

    /// Index from reconnection tokens to player ids, kept in sync with
    /// `sessions` so a resume doesn't scan every session.
    tokens: HashMap<String, PlayerId>,

    config: SessionConfig,
}

impl SessionManager {
    /// Creates a new, empty session manager with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Creates a new session for a player after successful
    /// authentication. Generates a fresh reconnection token.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the player already has a
    /// Connected session. A Disconnected or Expired session is replaced
    /// (and its old token invalidated).
    pub fn create(
        &mut self,
        player_id: PlayerId,
        display_name: impl Into<String>,
    ) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(&player_id) {
            if matches!(existing.state, SessionState::Connected) {
                return Err(SessionError::AlreadyConnected(player_id));
            }
            self.tokens.remove(&existing.reconnect_token);
        }

        let token = generate_token();

        let session = Session {
            player_id,
            display_name: display_name.into(),
            state: SessionState::Connected,
            last_seen_at: Instant::now(),
            reconnect_token: token.clone(),
        };

        self.tokens.insert(token, player_id);
        self.sessions.insert(player_id, session);

        tracing::info!(%player_id, "session created");

        Ok(self.sessions.get(&player_id).expect("just inserted"))
    }

    /// Marks a player as disconnected and starts their grace period.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;

        let now = Instant::now();
        session.state = SessionState::Disconnected { since: now };
        session.last_seen_at = now;

        tracing::info!(%player_id, "player disconnected, grace period started");
        Ok(())
    }

    /// Reconnects a player using their reconnection token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`] — token not recognized
    /// - [`SessionError::SessionExpired`] — grace period elapsed
    /// - [`SessionError::AlreadyConnected`] — session never dropped
    pub fn reconnect(&mut self, token: &str) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;

        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match &session.state {
            SessionState::Disconnected { since } => {
                let grace = Duration::from_secs(self.config.reconnect_grace_secs);
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    return Err(SessionError::SessionExpired(player_id));
                }
                session.state = SessionState::Connected;
                session.last_seen_at = Instant::now();
                tracing::info!(%player_id, "player reconnected");
                Ok(self.sessions.get(&player_id).expect("just modified"))
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(player_id)),
            SessionState::Expired => Err(SessionError::SessionExpired(player_id)),
        }
    }

    /// Refreshes a player's `last_seen_at`. Called on heartbeats and on
    /// every processed message.
    pub fn touch(&mut self, player_id: PlayerId) {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.last_seen_at = Instant::now();
        }
    }

    /// Updates a player's display name. The handshake only proves
    /// identity; the name arrives later, with the room join.
    pub fn set_display_name(&mut self, player_id: PlayerId, display_name: &str) {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.display_name = display_name.to_string();
        }
    }

    /// Expires every disconnected session past its grace period.
    /// Returns the expired player ids so higher layers can react
    /// (e.g. tell the player's lobby they are gone for good) before
    /// [`cleanup_expired`](Self::cleanup_expired) deletes the data.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = Duration::from_secs(self.config.reconnect_grace_secs);
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = &session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id);
                    tracing::info!(
                        player_id = %session.player_id,
                        "session expired (grace period elapsed)"
                    );
                }
            }
        }

        expired
    }

    /// Removes all expired sessions and invalidates their tokens.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                self.tokens.remove(&session.reconnect_token);
                false
            } else {
                true
            }
        });
    }

    /// Looks up a session by player id.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Number of sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions at all.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generates a random 32-character hex string (128 bits of entropy) —
/// enough that guessing a live token is computationally infeasible.
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Time-dependent behavior is tested with two configs instead of
    //! sleeps: `reconnect_grace_secs: 0` (instant expiry) and
    //! `reconnect_grace_secs: 3600` (never expires during a test).

    use super::*;

    fn manager_with_instant_expiry() -> SessionManager {
        SessionManager::new(SessionConfig { reconnect_grace_secs: 0 })
    }

    fn manager_with_long_grace() -> SessionManager {
        SessionManager::new(SessionConfig { reconnect_grace_secs: 3600 })
    }

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_new_player_returns_connected_session() {
        let mut mgr = manager_with_long_grace();

        let session = mgr.create(pid(1), "Ada").expect("should succeed");

        assert!(matches!(session.state, SessionState::Connected));
        assert_eq!(session.player_id, pid(1));
        assert_eq!(session.display_name, "Ada");
        assert_eq!(session.reconnect_token.len(), 32);
    }

    #[test]
    fn test_create_multiple_players_each_gets_unique_token() {
        let mut mgr = manager_with_long_grace();

        let token1 = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        let token2 = mgr.create(pid(2), "Grace").unwrap().reconnect_token.clone();

        assert_ne!(token1, token2, "tokens must be unique per player");
    }

    #[test]
    fn test_create_already_connected_returns_error() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid(1), "Ada").unwrap();

        let result = mgr.create(pid(1), "Ada again");

        assert!(matches!(result, Err(SessionError::AlreadyConnected(p)) if p == pid(1)));
    }

    #[test]
    fn test_create_replaces_disconnected_session_and_old_token() {
        let mut mgr = manager_with_long_grace();
        let old_token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        let session = mgr.create(pid(1), "Ada").expect("should replace");
        assert!(matches!(session.state, SessionState::Connected));

        mgr.disconnect(pid(1)).unwrap();
        assert!(
            matches!(mgr.reconnect(&old_token), Err(SessionError::InvalidToken)),
            "token from the replaced session must be dead"
        );
    }

    // =====================================================================
    // disconnect() / reconnect()
    // =====================================================================

    #[test]
    fn test_disconnect_connected_player_becomes_disconnected() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid(1), "Ada").unwrap();

        mgr.disconnect(pid(1)).expect("should succeed");

        let session = mgr.get(&pid(1)).expect("session should still exist");
        assert!(matches!(session.state, SessionState::Disconnected { .. }));
    }

    #[test]
    fn test_disconnect_unknown_player_returns_not_found() {
        let mut mgr = manager_with_long_grace();
        let result = mgr.disconnect(pid(99));
        assert!(matches!(result, Err(SessionError::NotFound(p)) if p == pid(99)));
    }

    #[test]
    fn test_reconnect_valid_token_restores_connected() {
        let mut mgr = manager_with_long_grace();
        let token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        let session = mgr.reconnect(&token).expect("should succeed");

        assert!(matches!(session.state, SessionState::Connected));
        assert_eq!(session.player_id, pid(1));
        assert_eq!(session.display_name, "Ada", "name survives the drop");
    }

    #[test]
    fn test_reconnect_invalid_token_returns_error() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid(1), "Ada").unwrap();
        mgr.disconnect(pid(1)).unwrap();

        assert!(matches!(
            mgr.reconnect("not-a-real-token"),
            Err(SessionError::InvalidToken)
        ));
    }

    #[test]
    fn test_reconnect_after_grace_period_returns_expired() {
        let mut mgr = manager_with_instant_expiry();
        let token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        let result = mgr.reconnect(&token);

        assert!(matches!(result, Err(SessionError::SessionExpired(p)) if p == pid(1)));
    }

    #[test]
    fn test_reconnect_already_connected_returns_error() {
        let mut mgr = manager_with_long_grace();
        let token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();

        let result = mgr.reconnect(&token);

        assert!(matches!(result, Err(SessionError::AlreadyConnected(p)) if p == pid(1)));
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[test]
    fn test_expire_stale_expires_only_timed_out_sessions() {
        let mut mgr = manager_with_instant_expiry();
        mgr.create(pid(1), "Ada").unwrap();
        mgr.create(pid(2), "Grace").unwrap();
        mgr.disconnect(pid(1)).unwrap();

        let expired = mgr.expire_stale();

        assert_eq!(expired, vec![pid(1)]);
        assert!(matches!(
            mgr.get(&pid(2)).unwrap().state,
            SessionState::Connected
        ));
    }

    #[test]
    fn test_expire_stale_skips_sessions_within_grace() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid(1), "Ada").unwrap();
        mgr.disconnect(pid(1)).unwrap();

        assert!(mgr.expire_stale().is_empty());
    }

    #[test]
    fn test_cleanup_expired_removes_sessions_and_tokens() {
        let mut mgr = manager_with_instant_expiry();
        let token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.disconnect(pid(1)).unwrap();
        mgr.expire_stale();
        assert_eq!(mgr.len(), 1, "expired but not yet cleaned up");

        mgr.cleanup_expired();

        assert!(mgr.is_empty());
        assert!(matches!(mgr.reconnect(&token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_cleanup_expired_preserves_active_sessions() {
        let mut mgr = manager_with_instant_expiry();
        mgr.create(pid(1), "Ada").unwrap();
        mgr.create(pid(2), "Grace").unwrap();
        mgr.disconnect(pid(1)).unwrap();
        mgr.expire_stale();

        mgr.cleanup_expired();

        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(&pid(1)).is_none());
        assert!(mgr.get(&pid(2)).is_some());
    }

    // =====================================================================
    // touch()
    // =====================================================================

    #[test]
    fn test_touch_refreshes_last_seen() {
        let mut mgr = manager_with_long_grace();
        let before = mgr.create(pid(1), "Ada").unwrap().last_seen_at;

        mgr.touch(pid(1));

        let after = mgr.get(&pid(1)).unwrap().last_seen_at;
        assert!(after >= before);
    }

    #[test]
    fn test_touch_unknown_player_is_a_noop() {
        let mut mgr = manager_with_long_grace();
        mgr.touch(pid(42));
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_set_display_name_updates_session() {
        let mut mgr = manager_with_long_grace();
        mgr.create(pid(1), "player-1").unwrap();

        mgr.set_display_name(pid(1), "Ada");

        assert_eq!(mgr.get(&pid(1)).unwrap().display_name, "Ada");
    }

    // =====================================================================
    // Full lifecycle
    // =====================================================================

    #[test]
    fn test_full_lifecycle_connect_disconnect_reconnect() {
        let mut mgr = manager_with_long_grace();

        let token = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.disconnect(pid(1)).unwrap();
        mgr.reconnect(&token).unwrap();

        assert!(matches!(
            mgr.get(&pid(1)).unwrap().state,
            SessionState::Connected
        ));
    }

    #[test]
    fn test_multiple_players_independent_lifecycles() {
        let mut mgr = manager_with_long_grace();

        let token1 = mgr.create(pid(1), "Ada").unwrap().reconnect_token.clone();
        mgr.create(pid(2), "Grace").unwrap();

        mgr.disconnect(pid(1)).unwrap();
        mgr.reconnect(&token1).unwrap();

        assert!(matches!(mgr.get(&pid(1)).unwrap().state, SessionState::Connected));
        assert!(matches!(mgr.get(&pid(2)).unwrap().state, SessionState::Connected));
    }
}
